// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info};

use crate::queue::task_queue::{Job, QueueError, QueueTopic, TaskQueue};

/// 任务调度器
///
/// 负责延迟入队（批次冷却）以及周期性地把过期的在途任务重新入队。
/// 延迟执行完全依赖队列的可执行时间，不会阻塞任何工作者。
#[derive(Clone)]
pub struct TaskScheduler {
    /// 任务队列
    queue: Arc<dyn TaskQueue>,
    /// 维护周期
    maintenance_interval: Duration,
}

impl TaskScheduler {
    /// 创建新的任务调度器实例
    ///
    /// # 参数
    ///
    /// * `queue` - 任务队列
    /// * `maintenance_interval` - 维护周期
    ///
    /// # 返回值
    ///
    /// 返回新的任务调度器实例
    pub fn new(queue: Arc<dyn TaskQueue>, maintenance_interval: Duration) -> Self {
        Self {
            queue,
            maintenance_interval,
        }
    }

    /// 启动调度器后台任务
    ///
    /// 每个维护周期把所有主题中可见性期限已过的在途任务重新入队
    ///
    /// # 返回值
    ///
    /// 返回后台任务的句柄
    pub fn start(&self) -> JoinHandle<()> {
        let scheduler = self.clone();

        tokio::spawn(async move {
            let mut interval = interval(scheduler.maintenance_interval);

            loop {
                interval.tick().await;
                scheduler.run_maintenance(Utc::now()).await;
                debug!("Scheduler maintenance tick");
            }
        })
    }

    /// 执行一次维护
    ///
    /// # 返回值
    ///
    /// 重新入队的任务总数
    pub async fn run_maintenance(&self, now: DateTime<Utc>) -> usize {
        let mut total = 0;
        for topic in QueueTopic::ALL {
            match self.queue.requeue_expired(topic, now).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Requeued {} stale jobs on {}", count, topic);
                    }
                    total += count;
                }
                Err(e) => {
                    error!("Failed to requeue stale jobs on {}: {}", topic, e);
                }
            }
        }
        total
    }

    /// 立即调度任务
    pub async fn schedule_now(&self, job: Job) -> Result<Job, QueueError> {
        self.schedule_at(job, Utc::now()).await
    }

    /// 在特定时间调度任务执行
    ///
    /// # 参数
    ///
    /// * `job` - 要调度的任务
    /// * `time` - 最早执行时间
    ///
    /// # 返回值
    ///
    /// * `Ok(Job)` - 调度成功的任务
    /// * `Err(QueueError)` - 调度失败
    pub async fn schedule_at(&self, mut job: Job, time: DateTime<Utc>) -> Result<Job, QueueError> {
        job.not_before = time;
        self.queue.enqueue(job.clone()).await?;
        Ok(job)
    }

    /// 在一段时间后调度任务执行
    ///
    /// # 参数
    ///
    /// * `job` - 要调度的任务
    /// * `delay` - 延迟时间
    ///
    /// # 返回值
    ///
    /// * `Ok(Job)` - 调度成功的任务
    /// * `Err(QueueError)` - 调度失败
    pub async fn schedule_in(&self, job: Job, delay: Duration) -> Result<Job, QueueError> {
        let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
        let time = Utc::now()
            .checked_add_signed(delay)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.schedule_at(job, time).await
    }
}
