// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::use_cases::batch_scheduler::BatchScheduler;
use crate::presentation::handlers::{crawl_handler, parse_handler};
use crate::queue::scheduler::TaskScheduler;
use axum::{
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// 处理器共享的服务
#[derive(Clone)]
pub struct AppServices {
    pub batch_scheduler: Arc<BatchScheduler>,
    pub task_scheduler: TaskScheduler,
}

/// 创建应用路由
///
/// # 参数
///
/// * `services` - 处理器共享的服务
///
/// # 返回值
///
/// 返回配置好的路由
pub fn routes(services: AppServices) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1/version", get(version))
        .route("/scraping-data/", post(crawl_handler::submit_scraping))
        .route("/status/{crawl_id}", get(crawl_handler::get_status))
        .route("/retry-failed/", post(crawl_handler::retry_failed))
        .route(
            "/start-parse/{bucket}/{*file_key}",
            post(parse_handler::start_parse),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(Extension(services.batch_scheduler))
                .layer(Extension(services.task_scheduler)),
        )
}

/// 健康检查端点
///
/// # 返回值
///
/// 返回"OK"字符串
pub async fn health_check() -> &'static str {
    "OK"
}

/// 版本信息端点
///
/// # 返回值
///
/// 返回应用版本号
pub async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
