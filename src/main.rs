// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use std::time::Duration;
use tablecrawl::application::use_cases::batch_scheduler::{BatchPolicy, BatchScheduler};
use tablecrawl::application::use_cases::parse_document::ParseDocumentUseCase;
use tablecrawl::config::settings::Settings;
use tablecrawl::domain::repositories::kv_store::KeyValueStore;
use tablecrawl::domain::services::attribute_extractor::{
    AttributeExtractor, LlmAttributeExtractor, NoAttributeExtractor,
};
use tablecrawl::domain::services::normalizer::Normalizer;
use tablecrawl::engines::browser_engine::BrowserFetcher;
use tablecrawl::engines::schema_fetcher::{Jitter, SchemaFetcher};
use tablecrawl::infrastructure::cache::memory_store::MemoryStore;
use tablecrawl::infrastructure::cache::redis_client::RedisClient;
use tablecrawl::infrastructure::result_writer::JsonWorkbookWriter;
use tablecrawl::infrastructure::storage::create_object_store;
use tablecrawl::presentation::routes::{self, AppServices};
use tablecrawl::queue::memory_queue::InMemoryTaskQueue;
use tablecrawl::queue::redis_queue::RedisTaskQueue;
use tablecrawl::queue::scheduler::TaskScheduler;
use tablecrawl::queue::task_queue::TaskQueue;
use tablecrawl::workers::manager::WorkerManager;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use tablecrawl::infrastructure::metrics;
use tablecrawl::utils::telemetry;

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并启动服务
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration
    let settings = Settings::new()?;

    // 2. Initialize logging
    telemetry::init_telemetry(settings.logging.format);
    info!("Starting tablecrawl...");

    if let Some(addr) = &settings.metrics.listen_addr {
        metrics::init_metrics(addr);
    }

    // 3. Key-value store and task queue
    let visibility_timeout = Duration::from_secs(settings.workers.visibility_timeout_secs);
    let (store, queue): (Arc<dyn KeyValueStore>, Arc<dyn TaskQueue>) = match &settings.redis.url
    {
        Some(url) => {
            let redis = Arc::new(RedisClient::new(url)?);
            info!("Redis client initialized");
            let queue: Arc<dyn TaskQueue> =
                Arc::new(RedisTaskQueue::new(redis.clone(), visibility_timeout));
            let store: Arc<dyn KeyValueStore> = redis;
            (store, queue)
        }
        None => {
            warn!("No Redis URL configured, using in-process store and queue");
            let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
            let queue: Arc<dyn TaskQueue> = Arc::new(InMemoryTaskQueue::new(visibility_timeout));
            (store, queue)
        }
    };

    // 4. Object storage
    let object_store = create_object_store(&settings.storage)?;
    info!("Object storage initialized ({})", settings.storage.storage_type);

    // 5. Fetching and scheduling
    let browser = BrowserFetcher::new(
        settings.fetch.remote_debugging_url.clone(),
        Duration::from_secs(settings.fetch.timeout_secs),
    )?;
    let schema_fetcher = SchemaFetcher::new(
        Arc::new(browser),
        object_store.clone(),
        settings.storage.input_bucket.clone(),
        Jitter {
            min_ms: settings.fetch.jitter_min_ms,
            max_ms: settings.fetch.jitter_max_ms,
        },
    );
    let task_scheduler = TaskScheduler::new(
        queue.clone(),
        Duration::from_secs(settings.workers.maintenance_interval_secs),
    );
    let batch_scheduler = Arc::new(BatchScheduler::new(
        store,
        task_scheduler.clone(),
        Arc::new(schema_fetcher),
        BatchPolicy::from(&settings.batch),
    ));

    // 6. Parsing
    let extractor: Arc<dyn AttributeExtractor> = match &settings.llm.api_key {
        Some(api_key) => Arc::new(LlmAttributeExtractor::new(
            api_key.clone(),
            settings.llm.model.clone(),
            settings.llm.api_base_url.clone(),
        )),
        None => {
            info!("No LLM API key configured, attribute enrichment disabled");
            Arc::new(NoAttributeExtractor)
        }
    };
    let writer = Arc::new(JsonWorkbookWriter::new(
        object_store.clone(),
        settings.storage.output_bucket.clone(),
    ));
    let parse_use_case = Arc::new(ParseDocumentUseCase::new(
        object_store,
        batch_scheduler.registry().clone(),
        extractor,
        writer,
        Normalizer::new(settings.normalizer.tbody_strategy),
        settings.normalizer.limits(),
    ));

    // 7. Start Workers
    let mut worker_manager = WorkerManager::new(
        queue,
        batch_scheduler.clone(),
        parse_use_case,
        task_scheduler.clone(),
        settings.workers.clone(),
    );
    worker_manager.start_workers();

    // 8. Start HTTP server
    let app = routes::routes(AppServices {
        batch_scheduler,
        task_scheduler,
    });

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    worker_manager.wait_for_shutdown().await;
    server.abort();

    Ok(())
}
