// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::repositories::kv_store::StoreError;

/// 队列错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    /// 后端存储错误
    #[error("Queue backend error: {0}")]
    Backend(#[from] StoreError),

    /// 任务无法序列化或反序列化
    #[error("Invalid job payload: {0}")]
    InvalidJob(#[from] serde_json::Error),
}

/// 队列主题
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueTopic {
    /// 批次处理与抓取
    Scraping,
    /// 规范化、提取与属性合并
    Parsing,
}

impl QueueTopic {
    pub const ALL: [QueueTopic; 2] = [QueueTopic::Scraping, QueueTopic::Parsing];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueTopic::Scraping => "scraping",
            QueueTopic::Parsing => "parsing",
        }
    }
}

impl fmt::Display for QueueTopic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobKind {
    /// 处理一个批次
    ProcessBatch { batch_key: String },
    /// 解析一个原始文档
    ParseDocument {
        bucket: String,
        key: String,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        crawl_id: Option<String>,
    },
}

impl JobKind {
    /// 任务所属的主题
    pub fn topic(&self) -> QueueTopic {
        match self {
            JobKind::ProcessBatch { .. } => QueueTopic::Scraping,
            JobKind::ParseDocument { .. } => QueueTopic::Parsing,
        }
    }
}

/// 队列中的任务信封
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    /// 最早可执行时间
    pub not_before: DateTime<Utc>,
    /// 已被投递的次数
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// 创建一个立即可执行的任务
    pub fn new(kind: JobKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            not_before: now,
            attempts: 0,
            created_at: now,
        }
    }

    pub fn topic(&self) -> QueueTopic {
        self.kind.topic()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now
    }
}

/// 一次投递
///
/// `receipt` 用于确认，确认前任务处于在途状态，超过可见性期限后会被重新投递
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub job: Job,
    pub receipt: String,
}

/// 任务队列特质
///
/// 至少一次投递：未确认的在途任务会在可见性期限过后重新入队
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// 入队任务，`not_before` 之前不会被投递
    async fn enqueue(&self, job: Job) -> Result<(), QueueError>;

    /// 取出一个在 `now` 时刻已到期的任务
    async fn dequeue(
        &self,
        topic: QueueTopic,
        now: DateTime<Utc>,
    ) -> Result<Option<Delivery>, QueueError>;

    /// 确认任务已处理完成
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// 把可见性期限已过的在途任务重新入队，返回数量
    async fn requeue_expired(
        &self,
        topic: QueueTopic,
        now: DateTime<Utc>,
    ) -> Result<usize, QueueError>;

    /// 等待中的任务数量（含未到期的）
    async fn pending(&self, topic: QueueTopic) -> Result<usize, QueueError>;
}

#[async_trait]
impl<T: TaskQueue + ?Sized> TaskQueue for Arc<T> {
    async fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        (**self).enqueue(job).await
    }

    async fn dequeue(
        &self,
        topic: QueueTopic,
        now: DateTime<Utc>,
    ) -> Result<Option<Delivery>, QueueError> {
        (**self).dequeue(topic, now).await
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        (**self).ack(delivery).await
    }

    async fn requeue_expired(
        &self,
        topic: QueueTopic,
        now: DateTime<Utc>,
    ) -> Result<usize, QueueError> {
        (**self).requeue_expired(topic, now).await
    }

    async fn pending(&self, topic: QueueTopic) -> Result<usize, QueueError> {
        (**self).pending(topic).await
    }
}
