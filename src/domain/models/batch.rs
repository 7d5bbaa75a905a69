// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::crawl_task::{CrawlTask, SchemaRef, SchemaType};

/// 批次记录中的单个条目，序列化为 `{url, crawl_id, schema:{type}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub url: String,
    pub crawl_id: String,
    pub schema: SchemaRef,
}

impl BatchEntry {
    pub fn schema_type(&self) -> SchemaType {
        self.schema.schema_type
    }
}

impl From<&CrawlTask> for BatchEntry {
    fn from(task: &CrawlTask) -> Self {
        Self {
            url: task.url.clone(),
            crawl_id: task.crawl_id.clone(),
            schema: task.schema_type.into(),
        }
    }
}

/// 批次
///
/// 一组被一起调度和处理的爬取任务，通过 `next_batch_key` 串联后继批次。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// 批次键，同时也是键值存储中的记录键
    pub batch_key: String,
    /// 有序的条目列表
    pub entries: Vec<BatchEntry>,
    /// 记录存活时间（秒）
    pub ttl_secs: u64,
    /// 后继批次键
    pub next_batch_key: Option<String>,
}

impl Batch {
    /// 创建一个带有新批次键的批次
    pub fn new(entries: Vec<BatchEntry>, ttl_secs: u64) -> Self {
        Self {
            batch_key: new_batch_key(),
            entries,
            ttl_secs,
            next_batch_key: None,
        }
    }
}

/// 生成新的批次键
pub fn new_batch_key() -> String {
    format!("batch:{}", Uuid::new_v4().simple())
}

/// 后继批次指针的键
pub fn next_batch_pointer_key(batch_key: &str) -> String {
    format!("next_batch_{}", batch_key)
}

/// 批次处理权的键，同一时刻只有一个投递可以持有
pub fn batch_claim_key(batch_key: &str) -> String {
    format!("batch_{}_claimed", batch_key)
}

/// 批次完成标记的键
pub fn completion_marker_key(batch_key: &str) -> String {
    format!("batch_{}_completed", batch_key)
}
