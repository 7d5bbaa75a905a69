// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

use crate::queue::task_queue::{Delivery, Job, QueueError, QueueTopic, TaskQueue};

struct InFlight {
    job: Job,
    deadline: DateTime<Utc>,
}

#[derive(Default)]
struct QueueState {
    ready: HashMap<QueueTopic, Vec<Job>>,
    in_flight: HashMap<String, InFlight>,
}

/// 内存任务队列
///
/// 单进程部署和测试使用，语义与Redis实现一致：
/// 按 `not_before` 排序投递，未确认的任务在可见性期限后重新入队
pub struct InMemoryTaskQueue {
    state: Mutex<QueueState>,
    visibility_timeout: Duration,
}

impl InMemoryTaskQueue {
    pub fn new(visibility_timeout: std::time::Duration) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            visibility_timeout: Duration::from_std(visibility_timeout)
                .unwrap_or_else(|_| Duration::minutes(15)),
        }
    }

    /// 查看某个主题中等待的全部任务（按可执行时间排序）
    pub fn snapshot(&self, topic: QueueTopic) -> Vec<Job> {
        let state = self.state.lock();
        state.ready.get(&topic).cloned().unwrap_or_default()
    }

    /// 在途任务数量
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight.len()
    }
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self::new(std::time::Duration::from_secs(900))
    }
}

fn insert_sorted(jobs: &mut Vec<Job>, job: Job) {
    let index = jobs.partition_point(|queued| queued.not_before <= job.not_before);
    jobs.insert(index, job);
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        let jobs = state.ready.entry(job.topic()).or_default();
        insert_sorted(jobs, job);
        Ok(())
    }

    async fn dequeue(
        &self,
        topic: QueueTopic,
        now: DateTime<Utc>,
    ) -> Result<Option<Delivery>, QueueError> {
        let mut state = self.state.lock();
        let Some(jobs) = state.ready.get_mut(&topic) else {
            return Ok(None);
        };
        if !jobs.first().is_some_and(|job| job.is_due(now)) {
            return Ok(None);
        }

        let mut job = jobs.remove(0);
        job.attempts += 1;
        let receipt = job.id.to_string();
        state.in_flight.insert(
            receipt.clone(),
            InFlight {
                job: job.clone(),
                deadline: now + self.visibility_timeout,
            },
        );
        Ok(Some(Delivery { job, receipt }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.state.lock().in_flight.remove(&delivery.receipt);
        Ok(())
    }

    async fn requeue_expired(
        &self,
        topic: QueueTopic,
        now: DateTime<Utc>,
    ) -> Result<usize, QueueError> {
        let mut state = self.state.lock();
        let expired: Vec<String> = state
            .in_flight
            .iter()
            .filter(|(_, entry)| entry.job.topic() == topic && entry.deadline <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        for receipt in &expired {
            if let Some(entry) = state.in_flight.remove(receipt) {
                debug!("Redelivering job {} on {}", entry.job.id, topic);
                let mut job = entry.job;
                job.not_before = now;
                let jobs = state.ready.entry(topic).or_default();
                insert_sorted(jobs, job);
            }
        }
        Ok(expired.len())
    }

    async fn pending(&self, topic: QueueTopic) -> Result<usize, QueueError> {
        Ok(self.state.lock().ready.get(&topic).map_or(0, Vec::len))
    }
}
