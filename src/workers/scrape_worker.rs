// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::use_cases::batch_scheduler::{BatchScheduler, SchedulerError};
use crate::queue::task_queue::{JobKind, QueueTopic, TaskQueue};
use crate::utils::errors::WorkerError;
use crate::workers::worker::Worker;

/// 抓取工作者
///
/// 消费 `scraping` 主题，每个任务处理一个批次
pub struct ScrapeWorker {
    queue: Arc<dyn TaskQueue>,
    scheduler: Arc<BatchScheduler>,
    name: String,
    poll_interval: Duration,
}

impl ScrapeWorker {
    /// 创建新的抓取工作器实例
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        scheduler: Arc<BatchScheduler>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            scheduler,
            name: format!("scrape-{}", Uuid::new_v4().simple()),
            poll_interval,
        }
    }
}

#[async_trait]
impl Worker for ScrapeWorker {
    async fn poll_once(&self) -> Result<bool, WorkerError> {
        let Some(delivery) = self.queue.dequeue(QueueTopic::Scraping, Utc::now()).await? else {
            return Ok(false);
        };

        let batch_key = match &delivery.job.kind {
            JobKind::ProcessBatch { batch_key } => batch_key.clone(),
            other => {
                self.queue.ack(&delivery).await?;
                return Err(WorkerError::UnexpectedJob(format!("{:?}", other)));
            }
        };

        match self.scheduler.process_batch(&batch_key).await {
            Ok(report) => {
                info!(
                    "Worker {} finished batch {} (attempt {})",
                    self.name, report.batch_key, delivery.job.attempts
                );
                self.queue.ack(&delivery).await?;
                Ok(true)
            }
            // A missing or unreadable batch is fatal for that batch and is not retried.
            Err(e @ (SchedulerError::BatchNotFound(_) | SchedulerError::CorruptBatchRecord { .. })) => {
                error!("Dropping batch {}: {}", batch_key, e);
                self.queue.ack(&delivery).await?;
                Ok(true)
            }
            // Redelivered after the visibility timeout, by then the completion marker decides.
            Err(SchedulerError::BatchInProgress(_)) => {
                info!(
                    "Batch {} is still running elsewhere, leaving delivery unacked",
                    batch_key
                );
                Ok(true)
            }
            Err(e) => {
                warn!(
                    "Batch {} left for redelivery after error: {}",
                    batch_key, e
                );
                Err(e.into())
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
