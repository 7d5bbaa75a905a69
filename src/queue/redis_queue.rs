// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::infrastructure::cache::redis_client::RedisClient;
use crate::queue::task_queue::{Delivery, Job, QueueError, QueueTopic, TaskQueue};

const CLAIM_BATCH: isize = 16;

/// Redis任务队列
///
/// 每个主题使用两个有序集合：
/// `tablecrawl:queue:{topic}` 以可执行时间为分数保存等待任务，
/// `tablecrawl:inflight:{topic}` 以可见性期限为分数保存在途任务。
/// 成员是任务的JSON，`ZREM` 成功的消费者获得该任务。
pub struct RedisTaskQueue {
    redis: Arc<RedisClient>,
    visibility_timeout: Duration,
}

impl RedisTaskQueue {
    pub fn new(redis: Arc<RedisClient>, visibility_timeout: Duration) -> Self {
        Self {
            redis,
            visibility_timeout,
        }
    }

    fn ready_key(topic: QueueTopic) -> String {
        format!("tablecrawl:queue:{}", topic)
    }

    fn in_flight_key(topic: QueueTopic) -> String {
        format!("tablecrawl:inflight:{}", topic)
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        let member = serde_json::to_string(&job)?;
        self.redis
            .zadd(
                &Self::ready_key(job.topic()),
                &member,
                job.not_before.timestamp_millis(),
            )
            .await?;
        debug!("Enqueued job {} on {}", job.id, job.topic());
        Ok(())
    }

    async fn dequeue(
        &self,
        topic: QueueTopic,
        now: DateTime<Utc>,
    ) -> Result<Option<Delivery>, QueueError> {
        let ready_key = Self::ready_key(topic);
        let candidates = self
            .redis
            .zrange_due(&ready_key, now.timestamp_millis(), CLAIM_BATCH)
            .await?;

        for member in candidates {
            // Another consumer may have claimed it first.
            if !self.redis.zrem(&ready_key, &member).await? {
                continue;
            }

            let mut job: Job = match serde_json::from_str(&member) {
                Ok(job) => job,
                Err(e) => {
                    warn!("Dropping unreadable job on {}: {}", topic, e);
                    continue;
                }
            };
            job.attempts += 1;

            let receipt = serde_json::to_string(&job)?;
            let deadline = now.timestamp_millis() + self.visibility_timeout.as_millis() as i64;
            self.redis
                .zadd(&Self::in_flight_key(topic), &receipt, deadline)
                .await?;
            return Ok(Some(Delivery { job, receipt }));
        }

        Ok(None)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.redis
            .zrem(&Self::in_flight_key(delivery.job.topic()), &delivery.receipt)
            .await?;
        Ok(())
    }

    async fn requeue_expired(
        &self,
        topic: QueueTopic,
        now: DateTime<Utc>,
    ) -> Result<usize, QueueError> {
        let in_flight_key = Self::in_flight_key(topic);
        let expired = self
            .redis
            .zrange_due(&in_flight_key, now.timestamp_millis(), CLAIM_BATCH)
            .await?;

        let mut requeued = 0;
        for member in expired {
            if !self.redis.zrem(&in_flight_key, &member).await? {
                continue;
            }
            match serde_json::from_str::<Job>(&member) {
                Ok(mut job) => {
                    job.not_before = now;
                    self.enqueue(job).await?;
                    requeued += 1;
                }
                Err(e) => warn!("Dropping unreadable in-flight job on {}: {}", topic, e),
            }
        }
        Ok(requeued)
    }

    async fn pending(&self, topic: QueueTopic) -> Result<usize, QueueError> {
        Ok(self.redis.zcard(&Self::ready_key(topic)).await? as usize)
    }
}
