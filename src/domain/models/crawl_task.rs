// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 内容模式错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// 不支持的模式类型，在提交阶段同步拒绝
    #[error("Invalid data_schema type: {0}")]
    InvalidSchema(String),
}

/// 内容模式类型
///
/// 决定一个URL使用哪种抓取例程，只有 `Table` 会触发后续的解析任务。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchemaType {
    /// 表格抓取，页面中的所有表格被保存为一个HTML文档
    #[default]
    Table,
    /// 图片抓取
    Image,
    /// 完整HTML页面抓取
    Html,
    /// PDF文档抓取
    Pdf,
}

impl SchemaType {
    /// 是否需要在抓取完成后进入解析队列
    pub fn needs_parsing(&self) -> bool {
        matches!(self, SchemaType::Table)
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SchemaType::Table => write!(f, "table"),
            SchemaType::Image => write!(f, "image"),
            SchemaType::Html => write!(f, "html"),
            SchemaType::Pdf => write!(f, "pdf"),
        }
    }
}

impl FromStr for SchemaType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "table" => Ok(SchemaType::Table),
            "image" => Ok(SchemaType::Image),
            "html" => Ok(SchemaType::Html),
            "pdf" => Ok(SchemaType::Pdf),
            _ => Err(SchemaError::InvalidSchema(s.to_string())),
        }
    }
}

/// 批次记录和爬取记录中保存的模式描述，序列化为 `{"type": "..."}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRef {
    #[serde(rename = "type")]
    pub schema_type: SchemaType,
}

impl From<SchemaType> for SchemaRef {
    fn from(schema_type: SchemaType) -> Self {
        Self { schema_type }
    }
}

/// 爬取状态
///
/// 状态转换遵循以下流程：
/// Scraping → Scraped → Parsing → Parsed，任意状态都可以进入 Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    /// 已提交，正在等待或执行抓取
    Scraping,
    /// 原始文档已写入对象存储
    Scraped,
    /// 正在解析表格
    Parsing,
    /// 结构化结果已生成
    Parsed,
    /// 失败，记录在失败台账中直到显式重试
    Failed,
}

impl CrawlStatus {
    /// 判断是否允许转换到目标状态
    ///
    /// 由于任务至少投递一次，同一状态的重复写入总是允许的；
    /// 重新提交或重试会把任何状态重置为 Scraping。
    pub fn can_transition_to(&self, next: CrawlStatus) -> bool {
        match next {
            CrawlStatus::Failed | CrawlStatus::Scraping => true,
            CrawlStatus::Scraped => matches!(self, CrawlStatus::Scraping | CrawlStatus::Scraped),
            CrawlStatus::Parsing => matches!(
                self,
                CrawlStatus::Scraped | CrawlStatus::Parsing | CrawlStatus::Parsed
            ),
            CrawlStatus::Parsed => matches!(self, CrawlStatus::Parsing | CrawlStatus::Parsed),
        }
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CrawlStatus::Scraping => write!(f, "scraping"),
            CrawlStatus::Scraped => write!(f, "scraped"),
            CrawlStatus::Parsing => write!(f, "parsing"),
            CrawlStatus::Parsed => write!(f, "parsed"),
            CrawlStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for CrawlStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scraping" => Ok(CrawlStatus::Scraping),
            "scraped" => Ok(CrawlStatus::Scraped),
            "parsing" => Ok(CrawlStatus::Parsing),
            "parsed" => Ok(CrawlStatus::Parsed),
            "failed" => Ok(CrawlStatus::Failed),
            _ => Err(()),
        }
    }
}

/// 根据URL计算稳定的爬取ID
///
/// 取URL的SHA-256摘要的前32个十六进制字符，同一URL总是得到同一ID，
/// 因此重复提交和重试都是幂等的。
pub fn crawl_id_for(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(digest)[..32].to_string()
}

/// 爬取任务实体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlTask {
    /// 由URL派生的稳定标识符
    pub crawl_id: String,
    /// 目标URL
    pub url: String,
    /// 内容模式
    pub schema_type: SchemaType,
    /// 当前状态
    pub status: CrawlStatus,
    /// 失败时记录的错误
    pub error: Option<String>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

impl CrawlTask {
    /// 创建一个新的爬取任务，初始状态为 Scraping
    pub fn new(url: impl Into<String>, schema_type: SchemaType) -> Self {
        let url = url.into();
        Self {
            crawl_id: crawl_id_for(&url),
            url,
            schema_type,
            status: CrawlStatus::Scraping,
            error: None,
            created_at: Utc::now(),
        }
    }
}

/// 注册表中的爬取记录，键为 `crawl_{crawl_id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlRecord {
    pub url: String,
    pub schema: SchemaRef,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub retry_count: u32,
}

/// 状态记录，键为 `status_{crawl_id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: CrawlStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 失败台账条目，键为 `failed_{crawl_id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub url: String,
    pub error: String,
    #[serde(rename = "retryCount", alias = "retry_count", default)]
    pub retry_count: u32,
    #[serde(default = "default_retry_flag")]
    pub retry: bool,
    #[serde(default = "default_failed_schema")]
    pub schema_type: SchemaType,
}

fn default_retry_flag() -> bool {
    true
}

// Ledger entries written without a schema are retried as plain HTML crawls.
fn default_failed_schema() -> SchemaType {
    SchemaType::Html
}
