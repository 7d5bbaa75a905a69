// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum_test::TestServer;
use std::sync::Arc;
use std::time::Duration;
use tablecrawl::application::use_cases::batch_scheduler::{BatchPolicy, BatchScheduler};
use tablecrawl::application::use_cases::parse_document::ParseDocumentUseCase;
use tablecrawl::domain::services::attribute_extractor::AttributeExtractor;
use tablecrawl::domain::services::normalizer::{Normalizer, TbodyStrategy};
use tablecrawl::domain::services::table_extractor::ExtractLimits;
use tablecrawl::engines::schema_fetcher::{Jitter, SchemaFetcher};
use tablecrawl::engines::scripted_fetcher::ScriptedFetcher;
use tablecrawl::infrastructure::cache::memory_store::MemoryStore;
use tablecrawl::infrastructure::result_writer::JsonWorkbookWriter;
use tablecrawl::infrastructure::storage::InMemoryStorage;
use tablecrawl::presentation::routes::{self, AppServices};
use tablecrawl::queue::memory_queue::InMemoryTaskQueue;
use tablecrawl::queue::scheduler::TaskScheduler;

pub const RAW_BUCKET: &str = "raw-documents";
pub const OUTPUT_BUCKET: &str = "structured-tables";

pub const TTL_SECS: u64 = 600;
pub const COOLDOWN_SECS: u64 = 1800;

pub const TABLE_PAGE: &str = r#"<html><body>
<h2>Deep groove ball bearings</h2>
<table>
  <thead><tr><th>Part</th><th>Size</th></tr></thead>
  <tbody>
    <tr><td>6204</td><td>20 mm</td></tr>
    <tr><td>6205</td><td>25 mm</td></tr>
  </tbody>
</table>
</body></html>"#;

/// 组装好的调度环境，全部使用内存实现
#[allow(dead_code)]
pub struct Harness {
    pub kv: Arc<MemoryStore>,
    pub queue: Arc<InMemoryTaskQueue>,
    pub objects: Arc<InMemoryStorage>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub task_scheduler: TaskScheduler,
    pub batch_scheduler: Arc<BatchScheduler>,
}

pub fn policy(size: usize) -> BatchPolicy {
    BatchPolicy {
        size,
        ttl_secs: TTL_SECS,
        cooldown_secs: COOLDOWN_SECS,
    }
}

pub fn harness(fetcher: ScriptedFetcher, policy: BatchPolicy) -> Harness {
    let kv = Arc::new(MemoryStore::new());
    let queue = Arc::new(InMemoryTaskQueue::new(Duration::from_secs(60)));
    let objects = Arc::new(InMemoryStorage::new());
    let fetcher = Arc::new(fetcher);

    let task_scheduler = TaskScheduler::new(queue.clone(), Duration::from_secs(60));
    let schema_fetcher = SchemaFetcher::new(
        fetcher.clone(),
        objects.clone(),
        RAW_BUCKET,
        Jitter::none(),
    );
    let batch_scheduler = Arc::new(BatchScheduler::new(
        kv.clone(),
        task_scheduler.clone(),
        Arc::new(schema_fetcher),
        policy,
    ));

    Harness {
        kv,
        queue,
        objects,
        fetcher,
        task_scheduler,
        batch_scheduler,
    }
}

impl Harness {
    /// 共享同一注册表和对象存储的解析用例
    pub fn parse_use_case(&self, extractor: Arc<dyn AttributeExtractor>) -> ParseDocumentUseCase {
        let writer = Arc::new(JsonWorkbookWriter::new(self.objects.clone(), OUTPUT_BUCKET));
        ParseDocumentUseCase::new(
            self.objects.clone(),
            self.batch_scheduler.registry().clone(),
            extractor,
            writer,
            Normalizer::new(TbodyStrategy::Merge),
            ExtractLimits::default(),
        )
    }

    /// 基于当前环境的HTTP测试服务器
    pub fn server(&self) -> TestServer {
        let app = routes::routes(AppServices {
            batch_scheduler: self.batch_scheduler.clone(),
            task_scheduler: self.task_scheduler.clone(),
        });
        TestServer::new(app).unwrap()
    }
}

pub fn urls(items: &[&str]) -> Vec<String> {
    items.iter().map(|u| u.to_string()).collect()
}
