// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::use_cases::batch_scheduler::BatchScheduler;
use crate::application::use_cases::parse_document::ParseDocumentUseCase;
use crate::config::settings::WorkerSettings;
use crate::queue::scheduler::TaskScheduler;
use crate::queue::task_queue::TaskQueue;
use crate::workers::parse_worker::ParseWorker;
use crate::workers::scrape_worker::ScrapeWorker;
use crate::workers::worker::Worker;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// 工作管理器
///
/// 管理抓取工作者、解析工作者以及调度器维护任务的生命周期
pub struct WorkerManager {
    queue: Arc<dyn TaskQueue>,
    batch_scheduler: Arc<BatchScheduler>,
    parse_use_case: Arc<ParseDocumentUseCase>,
    task_scheduler: TaskScheduler,
    settings: WorkerSettings,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerManager {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        batch_scheduler: Arc<BatchScheduler>,
        parse_use_case: Arc<ParseDocumentUseCase>,
        task_scheduler: TaskScheduler,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            queue,
            batch_scheduler,
            parse_use_case,
            task_scheduler,
            settings,
            handles: Vec::new(),
        }
    }

    /// 启动工作进程
    ///
    /// 按配置数量启动抓取和解析工作者，并启动调度器维护任务
    pub fn start_workers(&mut self) {
        let poll_interval = Duration::from_millis(self.settings.poll_interval_ms);

        for _ in 0..self.settings.scraping {
            let worker = ScrapeWorker::new(
                self.queue.clone(),
                self.batch_scheduler.clone(),
                poll_interval,
            );
            self.spawn(Arc::new(worker));
        }

        for _ in 0..self.settings.parsing {
            let worker = ParseWorker::new(
                self.queue.clone(),
                self.parse_use_case.clone(),
                poll_interval,
            );
            self.spawn(Arc::new(worker));
        }

        self.handles.push(self.task_scheduler.start());

        info!(
            "Started {} scraping and {} parsing workers",
            self.settings.scraping, self.settings.parsing
        );
    }

    fn spawn(&mut self, worker: Arc<dyn Worker>) {
        let handle = tokio::spawn(async move {
            if let Err(e) = worker.run().await {
                error!("Worker {} stopped: {}", worker.name(), e);
            }
        });
        self.handles.push(handle);
    }

    /// 正在运行的后台任务数量
    pub fn running(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// 停止所有后台任务
    ///
    /// 未确认的任务会在可见性期限过后被重新投递
    pub fn shutdown(&mut self) {
        info!("Shutting down workers...");
        for handle in self.handles.drain(..) {
            handle.abort();
        }
        info!("Workers shut down successfully");
    }

    /// 等待关闭信号并关闭工作进程
    pub async fn wait_for_shutdown(&mut self) {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }

        self.shutdown();
    }
}
