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

use crate::application::use_cases::parse_document::{ParseDocumentUseCase, ParseRequest};
use crate::queue::task_queue::{JobKind, QueueTopic, TaskQueue};
use crate::utils::errors::WorkerError;
use crate::workers::worker::Worker;

/// 解析工作者
///
/// 消费 `parsing` 主题，每个任务解析一个原始文档
pub struct ParseWorker {
    queue: Arc<dyn TaskQueue>,
    use_case: Arc<ParseDocumentUseCase>,
    name: String,
    poll_interval: Duration,
}

impl ParseWorker {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        use_case: Arc<ParseDocumentUseCase>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            use_case,
            name: format!("parse-{}", Uuid::new_v4().simple()),
            poll_interval,
        }
    }
}

#[async_trait]
impl Worker for ParseWorker {
    async fn poll_once(&self) -> Result<bool, WorkerError> {
        let Some(delivery) = self.queue.dequeue(QueueTopic::Parsing, Utc::now()).await? else {
            return Ok(false);
        };

        let request = match &delivery.job.kind {
            JobKind::ParseDocument {
                bucket,
                key,
                url,
                crawl_id,
            } => ParseRequest {
                bucket: bucket.clone(),
                key: key.clone(),
                url: url.clone(),
                crawl_id: crawl_id.clone(),
            },
            other => {
                self.queue.ack(&delivery).await?;
                return Err(WorkerError::UnexpectedJob(format!("{:?}", other)));
            }
        };

        match self.use_case.execute(&request).await {
            Ok(report) => {
                info!(
                    "Worker {} parsed {}: {} tables, {} issues",
                    self.name,
                    request.key,
                    report.tables.len(),
                    report.issues.len()
                );
                self.queue.ack(&delivery).await?;
                Ok(true)
            }
            // Redelivery cannot fix a missing or undecodable document.
            Err(e) if e.is_terminal() => {
                error!("Dropping parse job for {}: {}", request.key, e);
                self.queue.ack(&delivery).await?;
                Ok(true)
            }
            Err(e) => {
                warn!("Parse job for {} left for redelivery: {}", request.key, e);
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
