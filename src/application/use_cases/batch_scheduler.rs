// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::counter;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::config::settings::BatchSettings;
use crate::domain::models::batch::{
    batch_claim_key, completion_marker_key, next_batch_pointer_key, Batch, BatchEntry,
};
use crate::domain::models::crawl_task::{CrawlStatus, SchemaError, SchemaType, StatusRecord};
use crate::domain::repositories::kv_store::{KeyValueStore, StoreError};
use crate::domain::services::crawl_registry::{CrawlRegistry, RegistryError};
use crate::engines::schema_fetcher::SchemaFetcher;
use crate::infrastructure::metrics::{BATCHES_PROCESSED, URLS_FAILED, URLS_SCRAPED};
use crate::queue::scheduler::TaskScheduler;
use crate::queue::task_queue::{Job, JobKind, QueueError};

/// 批次调度错误类型
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// 不支持的内容模式
    #[error(transparent)]
    InvalidSchema(#[from] SchemaError),
    /// 批次记录不存在（已过期或从未写入）
    #[error("Batch not found: {0}")]
    BatchNotFound(String),
    /// 另一个投递正在处理该批次
    #[error("Batch {0} is already being processed")]
    BatchInProgress(String),
    /// 批次记录无法解析
    #[error("Corrupt batch record {batch_key}: {message}")]
    CorruptBatchRecord { batch_key: String, message: String },
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

/// 批次策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    /// 每个批次的URL数量
    pub size: usize,
    /// 批次记录存活时间（秒）
    pub ttl_secs: u64,
    /// 后继批次的冷却时间（秒）
    pub cooldown_secs: u64,
}

impl BatchPolicy {
    /// 批次链中第 `position` 个批次的存活时间
    ///
    /// 每个前驱批次最多占用一个TTL的处理时间加一个冷却时间，
    /// 后面的批次在轮到自己之前不会过期。
    pub fn ttl_for(&self, position: usize) -> u64 {
        let span = self.cooldown_secs.saturating_add(self.ttl_secs);
        self.ttl_secs
            .saturating_add(span.saturating_mul(position as u64))
    }
}

impl From<&BatchSettings> for BatchPolicy {
    fn from(settings: &BatchSettings) -> Self {
        Self {
            size: settings.size,
            ttl_secs: settings.ttl_secs,
            cooldown_secs: settings.cooldown_secs,
        }
    }
}

/// 提交结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitOutcome {
    /// 第一个批次的键，没有可处理的URL时为空
    pub first_batch_key: Option<String>,
    /// 按提交顺序排列的 `(url, crawl_id)`
    pub crawl_ids: Vec<(String, String)>,
    /// 因存在失败记录而跳过的URL
    pub skipped: Vec<String>,
    /// 仍在等待抓取、已有批次归属的URL，不会再次入批
    pub in_flight: Vec<String>,
}

/// 单个批次的处理报告
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub batch_key: String,
    pub scraped: usize,
    pub failed: usize,
    pub next_batch_key: Option<String>,
    /// 批次此前已完成，本次投递被忽略
    pub already_completed: bool,
}

/// 重试结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryOutcome {
    pub failed_urls: Vec<String>,
    pub first_batch_key: Option<String>,
}

/// 批次调度器
///
/// 把URL列表切分成有界批次写入键值存储，串联后继批次，
/// 逐条抓取并隔离失败，完成后按冷却时间延迟调度下一个批次。
#[derive(Clone)]
pub struct BatchScheduler {
    store: Arc<dyn KeyValueStore>,
    registry: CrawlRegistry,
    scheduler: TaskScheduler,
    fetcher: Arc<SchemaFetcher>,
    policy: BatchPolicy,
}

impl BatchScheduler {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        scheduler: TaskScheduler,
        fetcher: Arc<SchemaFetcher>,
        policy: BatchPolicy,
    ) -> Self {
        Self {
            registry: CrawlRegistry::new(store.clone()),
            store,
            scheduler,
            fetcher,
            policy,
        }
    }

    pub fn registry(&self) -> &CrawlRegistry {
        &self.registry
    }

    /// 提交一组URL
    ///
    /// 跳过存在失败记录的URL，去重后按批次大小切分，写入所有批次并只调度第一个。
    ///
    /// # 参数
    ///
    /// * `urls` - URL列表
    /// * `schema_type` - 内容模式名称
    ///
    /// # 返回值
    ///
    /// * `Ok(SubmitOutcome)` - 第一个批次键和每个URL的爬取ID
    /// * `Err(SchedulerError)` - 模式无效或存储/队列访问失败
    #[instrument(skip(self, urls), fields(count = urls.len()))]
    pub async fn submit(
        &self,
        urls: &[String],
        schema_type: &str,
    ) -> Result<SubmitOutcome, SchedulerError> {
        let schema_type: SchemaType = schema_type.parse()?;

        let mut seen = HashSet::new();
        let mut outcome = SubmitOutcome::default();
        let mut entries = Vec::new();

        for url in urls.iter().map(|u| u.trim()).filter(|u| !u.is_empty()) {
            if !seen.insert(url.to_string()) {
                debug!("Ignoring duplicate URL {}", url);
                continue;
            }
            if self.registry.is_quarantined(url).await? {
                info!("Skipping {}, it previously failed", url);
                outcome.skipped.push(url.to_string());
                continue;
            }

            let registration = self.registry.register(url, schema_type).await?;
            outcome
                .crawl_ids
                .push((url.to_string(), registration.crawl_id.clone()));
            if !registration.created && registration.status == CrawlStatus::Scraping {
                info!("Skipping {}, it is still waiting in a batch", url);
                outcome.in_flight.push(url.to_string());
                continue;
            }
            entries.push(BatchEntry {
                url: url.to_string(),
                crawl_id: registration.crawl_id,
                schema: schema_type.into(),
            });
        }

        outcome.first_batch_key = self.create_batches(entries).await?;
        Ok(outcome)
    }

    /// 处理一个批次
    ///
    /// 单个URL的失败只写入失败台账，不会中断批次。批次记录缺失或损坏时返回错误，
    /// 不做自动重试。处理前先取得批次处理权，可见性超时后重新投递的同一批次
    /// 在前一个投递完成之前得到 `BatchInProgress`。
    ///
    /// # 参数
    ///
    /// * `batch_key` - 批次键
    ///
    /// # 返回值
    ///
    /// * `Ok(BatchReport)` - 处理报告
    /// * `Err(SchedulerError)` - 批次不存在、记录损坏、正被处理或注册表访问失败
    #[instrument(skip(self))]
    pub async fn process_batch(&self, batch_key: &str) -> Result<BatchReport, SchedulerError> {
        if self.store.exists(&completion_marker_key(batch_key)).await? {
            info!("Batch {} already completed, ignoring redelivery", batch_key);
            return Ok(BatchReport {
                batch_key: batch_key.to_string(),
                already_completed: true,
                ..BatchReport::default()
            });
        }

        let claim = batch_claim_key(batch_key);
        if !self
            .store
            .set_nx_ex(&claim, "1", self.policy.ttl_secs)
            .await?
        {
            info!("Batch {} is held by another delivery", batch_key);
            return Err(SchedulerError::BatchInProgress(batch_key.to_string()));
        }

        let result = self.run_batch(batch_key).await;
        if result.is_err() {
            // Release the claim so a redelivery can resume the batch.
            if let Err(e) = self.store.delete(&claim).await {
                warn!("Failed to release claim on batch {}: {}", batch_key, e);
            }
        }
        result
    }

    async fn run_batch(&self, batch_key: &str) -> Result<BatchReport, SchedulerError> {
        let marker = completion_marker_key(batch_key);
        let entries = self.load_batch(batch_key).await.inspect_err(|e| {
            error!("Cannot process batch {}: {}", batch_key, e);
        })?;
        info!("Processing batch {} with {} tasks", batch_key, entries.len());

        let mut report = BatchReport {
            batch_key: batch_key.to_string(),
            ..BatchReport::default()
        };
        let claim = batch_claim_key(batch_key);
        for entry in &entries {
            if self.process_entry(entry).await? {
                report.scraped += 1;
            } else {
                report.failed += 1;
            }
            // Each entry renews the claim, so slow batches keep it until they finish.
            self.store.expire(&claim, self.policy.ttl_secs).await?;
        }

        report.next_batch_key = self.schedule_successor(batch_key).await?;
        self.store
            .set_ex(&marker, "1", self.policy.ttl_secs)
            .await?;
        counter!(BATCHES_PROCESSED).increment(1);

        info!(
            "Batch {} done: {} scraped, {} failed",
            batch_key, report.scraped, report.failed
        );
        Ok(report)
    }

    /// 重试失败台账中的所有URL
    ///
    /// 清除台账条目并把它们作为新的批次链重新提交
    #[instrument(skip(self))]
    pub async fn retry_failed(&self) -> Result<RetryOutcome, SchedulerError> {
        let failed = self.registry.failed_entries().await?;
        let mut outcome = RetryOutcome::default();
        let mut entries = Vec::with_capacity(failed.len());

        for entry in &failed {
            self.registry.prepare_retry(entry).await?;
            outcome.failed_urls.push(entry.record.url.clone());
            entries.push(BatchEntry {
                url: entry.record.url.clone(),
                crawl_id: entry.crawl_id.clone(),
                schema: entry.record.schema_type.into(),
            });
        }

        if !entries.is_empty() {
            info!("Retrying {} failed URLs", entries.len());
        }
        outcome.first_batch_key = self.create_batches(entries).await?;
        Ok(outcome)
    }

    /// 查询爬取状态，未知的爬取ID返回 `None`
    pub async fn status(&self, crawl_id: &str) -> Result<Option<StatusRecord>, SchedulerError> {
        Ok(self.registry.get_status(crawl_id).await?)
    }

    async fn create_batches(
        &self,
        entries: Vec<BatchEntry>,
    ) -> Result<Option<String>, SchedulerError> {
        let batches: Vec<Batch> = entries
            .chunks(self.policy.size.max(1))
            .enumerate()
            .map(|(position, chunk)| Batch::new(chunk.to_vec(), self.policy.ttl_for(position)))
            .collect();

        let Some(first) = batches.first().map(|batch| batch.batch_key.clone()) else {
            info!("No valid URLs to process");
            return Ok(None);
        };

        let successors = batches
            .iter()
            .skip(1)
            .map(|batch| Some(batch.batch_key.clone()))
            .chain(std::iter::once(None));
        for (mut batch, next) in batches.clone().into_iter().zip(successors) {
            batch.next_batch_key = next;
            self.write_batch(&batch).await?;
        }

        self.scheduler
            .schedule_now(Job::new(JobKind::ProcessBatch {
                batch_key: first.clone(),
            }))
            .await?;
        info!(
            "Created {} batch(es), first batch {} scheduled",
            batches.len(),
            first
        );
        Ok(Some(first))
    }

    async fn write_batch(&self, batch: &Batch) -> Result<(), SchedulerError> {
        let record =
            serde_json::to_string(&batch.entries).map_err(|e| SchedulerError::CorruptBatchRecord {
                batch_key: batch.batch_key.clone(),
                message: e.to_string(),
            })?;
        self.store
            .set_ex(&batch.batch_key, &record, batch.ttl_secs)
            .await?;

        if let Some(next) = &batch.next_batch_key {
            self.store
                .set_ex(&next_batch_pointer_key(&batch.batch_key), next, batch.ttl_secs)
                .await?;
        }
        debug!(
            "Stored batch {} with {} tasks",
            batch.batch_key,
            batch.entries.len()
        );
        Ok(())
    }

    async fn load_batch(&self, batch_key: &str) -> Result<Vec<BatchEntry>, SchedulerError> {
        let raw = self
            .store
            .get(batch_key)
            .await?
            .ok_or_else(|| SchedulerError::BatchNotFound(batch_key.to_string()))?;

        serde_json::from_str(&raw).map_err(|e| SchedulerError::CorruptBatchRecord {
            batch_key: batch_key.to_string(),
            message: e.to_string(),
        })
    }

    // Returns whether the entry was fetched and stored.
    #[instrument(skip(self, entry), fields(crawl_id = %entry.crawl_id))]
    async fn process_entry(&self, entry: &BatchEntry) -> Result<bool, SchedulerError> {
        self.update_status(&entry.crawl_id, CrawlStatus::Scraping)
            .await?;

        match self.fetcher.fetch(entry).await {
            Ok(outcome) => {
                self.update_status(&entry.crawl_id, CrawlStatus::Scraped)
                    .await?;
                counter!(URLS_SCRAPED).increment(1);

                if let (true, Some(key)) = (entry.schema_type().needs_parsing(), outcome.document_key) {
                    self.scheduler
                        .schedule_now(Job::new(JobKind::ParseDocument {
                            bucket: self.fetcher.bucket().to_string(),
                            key,
                            url: Some(entry.url.clone()),
                            crawl_id: Some(entry.crawl_id.clone()),
                        }))
                        .await?;
                }
                Ok(true)
            }
            Err(e) => {
                self.registry
                    .record_failure(
                        &entry.crawl_id,
                        &entry.url,
                        entry.schema_type(),
                        &e.to_string(),
                    )
                    .await?;
                counter!(URLS_FAILED, "reason" => e.kind()).increment(1);
                Ok(false)
            }
        }
    }

    // A concurrent writer may already have moved the entry on; that is not fatal.
    async fn update_status(&self, crawl_id: &str, status: CrawlStatus) -> Result<(), SchedulerError> {
        match self.registry.set_status(crawl_id, status, None).await {
            Ok(()) => Ok(()),
            Err(RegistryError::InvalidTransition { from, to, .. }) => {
                warn!("Skipping status update for {}: {} -> {}", crawl_id, from, to);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn schedule_successor(&self, batch_key: &str) -> Result<Option<String>, SchedulerError> {
        let Some(next) = self.store.get(&next_batch_pointer_key(batch_key)).await? else {
            return Ok(None);
        };

        // The successor waits out the cooldown before its own TTL starts to matter.
        let extended_ttl = self.policy.cooldown_secs + self.policy.ttl_secs;
        if !self.store.expire(&next, extended_ttl).await? {
            warn!("Successor batch {} of {} has already expired", next, batch_key);
        }
        self.store
            .expire(&next_batch_pointer_key(&next), extended_ttl)
            .await?;

        self.scheduler
            .schedule_in(
                Job::new(JobKind::ProcessBatch {
                    batch_key: next.clone(),
                }),
                Duration::from_secs(self.policy.cooldown_secs),
            )
            .await?;
        info!(
            "Scheduled batch {} in {} seconds",
            next, self.policy.cooldown_secs
        );
        Ok(Some(next))
    }
}
