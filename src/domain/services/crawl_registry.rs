// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::models::crawl_task::{
    crawl_id_for, CrawlRecord, CrawlStatus, FailureRecord, SchemaType, StatusRecord,
};
use crate::domain::repositories::kv_store::{KeyValueStore, StoreError};

const CRAWL_PREFIX: &str = "crawl_";
const STATUS_PREFIX: &str = "status_";
const FAILED_PREFIX: &str = "failed_";

/// 注册表错误类型
#[derive(Error, Debug)]
pub enum RegistryError {
    /// 键值存储错误
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    /// 记录无法解析
    #[error("Corrupt registry record {key}: {message}")]
    Corrupt { key: String, message: String },
    /// 非法的状态转换
    #[error("Invalid status transition for {crawl_id}: {from} -> {to}")]
    InvalidTransition {
        crawl_id: String,
        from: CrawlStatus,
        to: CrawlStatus,
    },
}

/// 注册结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub crawl_id: String,
    /// 是否新写入了记录；已有未失败记录时为 `false`
    pub created: bool,
    /// 注册后的状态，已有记录时为其原状态
    pub status: CrawlStatus,
}

/// 失败台账中的一条记录及其爬取ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedEntry {
    pub crawl_id: String,
    pub record: FailureRecord,
}

/// 爬取注册表
///
/// 维护 crawl_id 到 URL、内容模式和生命周期状态的映射，
/// 以及失败台账。所有状态都保存在外部键值存储中。
#[derive(Clone)]
pub struct CrawlRegistry {
    store: Arc<dyn KeyValueStore>,
}

impl CrawlRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// 注册一个URL
    ///
    /// 对同一URL总是返回同一 crawl_id；已存在且未失败的记录不会被覆盖。
    ///
    /// # 参数
    ///
    /// * `url` - 目标URL
    /// * `schema_type` - 内容模式
    ///
    /// # 返回值
    ///
    /// * `Ok(Registration)` - 爬取ID以及是否新建了记录
    /// * `Err(RegistryError)` - 存储访问失败或记录损坏
    pub async fn register(
        &self,
        url: &str,
        schema_type: SchemaType,
    ) -> Result<Registration, RegistryError> {
        let crawl_id = crawl_id_for(url);

        if let Some(status) = self.get_status(&crawl_id).await? {
            if status.status != CrawlStatus::Failed {
                debug!("Crawl {} already registered as {}", crawl_id, status.status);
                return Ok(Registration {
                    crawl_id,
                    created: false,
                    status: status.status,
                });
            }
        }

        let retry_count = self
            .get_record(&crawl_id)
            .await?
            .map(|record| record.retry_count)
            .unwrap_or(0);
        let record = CrawlRecord {
            url: url.to_string(),
            schema: schema_type.into(),
            created_at: Utc::now(),
            retry_count,
        };
        self.write_json(&crawl_key(&crawl_id), &record).await?;
        self.write_status(&crawl_id, CrawlStatus::Scraping, None)
            .await?;

        info!("Registered crawl {} for {}", crawl_id, url);
        Ok(Registration {
            crawl_id,
            created: true,
            status: CrawlStatus::Scraping,
        })
    }

    /// 更新状态
    ///
    /// 违反状态机的转换返回 `InvalidTransition`，不会写入
    pub async fn set_status(
        &self,
        crawl_id: &str,
        status: CrawlStatus,
        error: Option<String>,
    ) -> Result<(), RegistryError> {
        if let Some(current) = self.get_status(crawl_id).await? {
            if !current.status.can_transition_to(status) {
                return Err(RegistryError::InvalidTransition {
                    crawl_id: crawl_id.to_string(),
                    from: current.status,
                    to: status,
                });
            }
        }
        self.write_status(crawl_id, status, error).await
    }

    /// 查询状态，未知的 crawl_id 返回 `None`
    pub async fn get_status(&self, crawl_id: &str) -> Result<Option<StatusRecord>, RegistryError> {
        self.read_json(&status_key(crawl_id)).await
    }

    /// 读取爬取记录
    pub async fn get_record(&self, crawl_id: &str) -> Result<Option<CrawlRecord>, RegistryError> {
        self.read_json(&crawl_key(crawl_id)).await
    }

    /// 记录一次失败
    ///
    /// 写入失败台账并把状态置为 `failed`。
    /// `retryCount` 取自爬取记录，首次失败为 0。
    pub async fn record_failure(
        &self,
        crawl_id: &str,
        url: &str,
        schema_type: SchemaType,
        error: &str,
    ) -> Result<(), RegistryError> {
        let retry_count = self
            .get_record(crawl_id)
            .await?
            .map(|record| record.retry_count)
            .unwrap_or(0);
        let entry = FailureRecord {
            url: url.to_string(),
            error: error.to_string(),
            retry_count,
            retry: true,
            schema_type,
        };
        self.write_json(&failed_key(crawl_id), &entry).await?;
        self.write_status(crawl_id, CrawlStatus::Failed, Some(error.to_string()))
            .await?;

        warn!("Crawl {} quarantined: {}", crawl_id, error);
        Ok(())
    }

    /// URL是否有未处理的失败台账记录
    pub async fn is_quarantined(&self, url: &str) -> Result<bool, RegistryError> {
        Ok(self.store.exists(&failed_key(&crawl_id_for(url))).await?)
    }

    /// 列出失败台账
    ///
    /// 无法解析的条目被跳过并记录警告，台账本身允许丢失更新
    pub async fn failed_entries(&self) -> Result<Vec<FailedEntry>, RegistryError> {
        let keys = self.store.keys_with_prefix(FAILED_PREFIX).await?;
        let mut entries = Vec::with_capacity(keys.len());

        for key in keys {
            let crawl_id = key.trim_start_matches(FAILED_PREFIX).to_string();
            match self.read_json::<FailureRecord>(&key).await {
                Ok(Some(record)) => entries.push(FailedEntry { crawl_id, record }),
                Ok(None) => {}
                Err(RegistryError::Corrupt { key, message }) => {
                    warn!("Skipping unreadable failure entry {}: {}", key, message);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(entries)
    }

    /// 为重试清除失败记录
    ///
    /// 删除台账条目，重试次数加一，并把状态重置为 `scraping`
    pub async fn prepare_retry(&self, entry: &FailedEntry) -> Result<(), RegistryError> {
        let crawl_id = &entry.crawl_id;
        let record = match self.get_record(crawl_id).await? {
            Some(mut record) => {
                record.retry_count = record.retry_count.saturating_add(1);
                record
            }
            None => CrawlRecord {
                url: entry.record.url.clone(),
                schema: entry.record.schema_type.into(),
                created_at: Utc::now(),
                retry_count: entry.record.retry_count.saturating_add(1),
            },
        };
        self.write_json(&crawl_key(crawl_id), &record).await?;
        self.store.delete(&failed_key(crawl_id)).await?;
        self.write_status(crawl_id, CrawlStatus::Scraping, None)
            .await
    }

    async fn write_status(
        &self,
        crawl_id: &str,
        status: CrawlStatus,
        error: Option<String>,
    ) -> Result<(), RegistryError> {
        let record = StatusRecord { status, error };
        self.write_json(&status_key(crawl_id), &record).await
    }

    async fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), RegistryError> {
        let json = serde_json::to_string(value).map_err(|e| RegistryError::Corrupt {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.store.set(key, &json).await?;
        Ok(())
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, RegistryError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| RegistryError::Corrupt {
                key: key.to_string(),
                message: e.to_string(),
            })
    }
}

fn crawl_key(crawl_id: &str) -> String {
    format!("{}{}", CRAWL_PREFIX, crawl_id)
}

fn status_key(crawl_id: &str) -> String {
    format!("{}{}", STATUS_PREFIX, crawl_id)
}

fn failed_key(crawl_id: &str) -> String {
    format!("{}{}", FAILED_PREFIX, crawl_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::cache::memory_store::MemoryStore;

    fn registry() -> (CrawlRegistry, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (CrawlRegistry::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let (registry, _) = registry();
        let first = registry.register("http://x/a", SchemaType::Table).await.unwrap();
        assert!(first.created);

        registry
            .set_status(&first.crawl_id, CrawlStatus::Scraped, None)
            .await
            .unwrap();

        let second = registry.register("http://x/a", SchemaType::Table).await.unwrap();
        assert_eq!(second.crawl_id, first.crawl_id);
        assert!(!second.created);

        let status = registry.get_status(&first.crawl_id).await.unwrap().unwrap();
        assert_eq!(status.status, CrawlStatus::Scraped);
    }

    #[tokio::test]
    async fn test_status_of_unknown_crawl() {
        let (registry, _) = registry();
        assert_eq!(registry.get_status("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_transition_is_rejected() {
        let (registry, _) = registry();
        let reg = registry.register("http://x/a", SchemaType::Table).await.unwrap();

        let err = registry
            .set_status(&reg.crawl_id, CrawlStatus::Parsed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_failure_ledger_and_retry() {
        let (registry, store) = registry();
        let reg = registry.register("http://x/a", SchemaType::Pdf).await.unwrap();

        registry
            .record_failure(&reg.crawl_id, "http://x/a", SchemaType::Pdf, "timeout")
            .await
            .unwrap();
        assert!(registry.is_quarantined("http://x/a").await.unwrap());

        let raw = store
            .get(&format!("failed_{}", reg.crawl_id))
            .await
            .unwrap()
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["retryCount"], 0);
        assert_eq!(json["retry"], true);

        let status = registry.get_status(&reg.crawl_id).await.unwrap().unwrap();
        assert_eq!(status.status, CrawlStatus::Failed);
        assert_eq!(status.error.as_deref(), Some("timeout"));

        let entries = registry.failed_entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        registry.prepare_retry(&entries[0]).await.unwrap();

        assert!(!registry.is_quarantined("http://x/a").await.unwrap());
        let record = registry.get_record(&reg.crawl_id).await.unwrap().unwrap();
        assert_eq!(record.retry_count, 1);

        registry
            .record_failure(&reg.crawl_id, "http://x/a", SchemaType::Pdf, "again")
            .await
            .unwrap();
        let entries = registry.failed_entries().await.unwrap();
        assert_eq!(entries[0].record.retry_count, 1);
    }

    #[tokio::test]
    async fn test_failed_record_is_overwritten_on_register() {
        let (registry, _) = registry();
        let reg = registry.register("http://x/a", SchemaType::Table).await.unwrap();
        registry
            .record_failure(&reg.crawl_id, "http://x/a", SchemaType::Table, "boom")
            .await
            .unwrap();

        let again = registry.register("http://x/a", SchemaType::Table).await.unwrap();
        assert!(again.created);
    }

    #[tokio::test]
    async fn test_corrupt_ledger_entry_is_skipped() {
        let (registry, store) = registry();
        store.set("failed_bad", "not json").await.unwrap();
        store
            .set(
                "failed_good",
                r#"{"url":"http://x/b","error":"e","retryCount":2,"retry":true}"#,
            )
            .await
            .unwrap();

        let entries = registry.failed_entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].crawl_id, "good");
        assert_eq!(entries[0].record.schema_type, SchemaType::Html);
    }

    #[tokio::test]
    async fn test_corrupt_status_is_an_error() {
        let (registry, store) = registry();
        store.set("status_x", "{").await.unwrap();
        assert!(matches!(
            registry.get_status("x").await,
            Err(RegistryError::Corrupt { .. })
        ));
    }
}
