// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{describe_counter, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

pub const URLS_SCRAPED: &str = "tablecrawl_urls_scraped_total";
pub const URLS_FAILED: &str = "tablecrawl_urls_failed_total";
pub const BATCHES_PROCESSED: &str = "tablecrawl_batches_processed_total";
pub const TABLES_EXTRACTED: &str = "tablecrawl_tables_extracted_total";
pub const TABLES_SKIPPED: &str = "tablecrawl_tables_skipped_total";

/// 安装 Prometheus 导出器并注册计数器说明
///
/// 地址无效或端口被占用时只记录警告，计数器调用在没有导出器时是空操作
pub fn init_metrics(listen_addr: &str) {
    let addr: SocketAddr = match listen_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("Invalid metrics address {}: {}", listen_addr, e);
            return;
        }
    };

    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        warn!("Failed to install Prometheus recorder: {}. This might happen if the port is already in use.", e);
        return;
    }

    describe_metrics();
    info!("Metrics exporter listening on {}", addr);
}

fn describe_metrics() {
    describe_counter!(URLS_SCRAPED, Unit::Count, "URLs fetched and stored successfully");
    describe_counter!(URLS_FAILED, Unit::Count, "URLs quarantined in the failure ledger");
    describe_counter!(BATCHES_PROCESSED, Unit::Count, "Batches fully processed");
    describe_counter!(TABLES_EXTRACTED, Unit::Count, "Tables written as structured results");
    describe_counter!(TABLES_SKIPPED, Unit::Count, "Tables skipped as empty or unrepairable");
}
