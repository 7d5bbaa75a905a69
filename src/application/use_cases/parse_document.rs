// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::counter;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::models::crawl_task::{crawl_id_for, CrawlStatus, SchemaType};
use crate::domain::models::table::{StructuredResult, TableError};
use crate::domain::repositories::object_store::{ObjectStore, StorageError};
use crate::domain::repositories::result_writer::ResultWriter;
use crate::domain::services::attribute_enricher::enrich;
use crate::domain::services::attribute_extractor::AttributeExtractor;
use crate::domain::services::crawl_registry::{CrawlRegistry, RegistryError};
use crate::domain::services::normalizer::Normalizer;
use crate::domain::services::table_extractor::{try_extract, ExtractLimits};
use crate::infrastructure::metrics::{TABLES_EXTRACTED, TABLES_SKIPPED};
use crate::utils::text_encoding::{decode_document, TextEncodingError};

/// 解析任务错误类型，对单个解析任务是致命的
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Document not found: {bucket}/{key}")]
    DocumentNotFound { bucket: String, key: String },
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Failed to decode document: {0}")]
    Encoding(#[from] TextEncodingError),
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl ParseError {
    /// 重新投递无法修复的错误：文档缺失或无法解码
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ParseError::DocumentNotFound { .. } | ParseError::Encoding(_)
        )
    }
}

/// 解析请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRequest {
    pub bucket: String,
    pub key: String,
    pub url: Option<String>,
    /// 存在时跟踪注册表状态 `scraped → parsing → parsed`
    pub crawl_id: Option<String>,
}

/// 文档级问题，不会中断文档处理
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentIssue {
    Table(TableError),
    AttributeExtraction { message: String },
    Persistence { message: String },
}

impl fmt::Display for DocumentIssue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DocumentIssue::Table(e) => write!(f, "{}", e),
            DocumentIssue::AttributeExtraction { message } => {
                write!(f, "attribute extraction failed: {}", message)
            }
            DocumentIssue::Persistence { message } => write!(f, "persistence failed: {}", message),
        }
    }
}

/// 解析报告
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseReport {
    pub crawl_id: String,
    /// 成功处理的表格
    pub tables: Vec<StructuredResult>,
    /// 被跳过的表格和其他问题
    pub issues: Vec<DocumentIssue>,
    /// 写入的结果对象键
    pub output_key: Option<String>,
}

/// 解析用例
///
/// 读取原始文档，依次执行规范化、表格提取、属性合并，最后交给结果写入器。
pub struct ParseDocumentUseCase {
    store: Arc<dyn ObjectStore>,
    registry: CrawlRegistry,
    extractor: Arc<dyn AttributeExtractor>,
    writer: Arc<dyn ResultWriter>,
    normalizer: Normalizer,
    limits: ExtractLimits,
}

impl ParseDocumentUseCase {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        registry: CrawlRegistry,
        extractor: Arc<dyn AttributeExtractor>,
        writer: Arc<dyn ResultWriter>,
        normalizer: Normalizer,
        limits: ExtractLimits,
    ) -> Self {
        Self {
            store,
            registry,
            extractor,
            writer,
            normalizer,
            limits,
        }
    }

    /// 执行解析
    ///
    /// 同一源文档重复执行得到相同的结构化结果。终止性错误写入失败台账；
    /// 其他错误保持 `parsing` 状态，由重新投递的任务继续推进。
    ///
    /// # 参数
    ///
    /// * `request` - 解析请求
    ///
    /// # 返回值
    ///
    /// * `Ok(ParseReport)` - 处理结果，包括被跳过的表格
    /// * `Err(ParseError)` - 文档无法读取或解码
    #[instrument(skip(self, request), fields(bucket = %request.bucket, key = %request.key))]
    pub async fn execute(&self, request: &ParseRequest) -> Result<ParseReport, ParseError> {
        let tracked = request.crawl_id.as_deref();
        if let Some(crawl_id) = tracked {
            self.update_status(crawl_id, CrawlStatus::Parsing).await?;
        }

        match self.run(request).await {
            Ok(report) => {
                if let Some(crawl_id) = tracked {
                    self.update_status(crawl_id, CrawlStatus::Parsed).await?;
                }
                Ok(report)
            }
            Err(e) if e.is_terminal() => {
                error!("Failed to parse {}/{}: {}", request.bucket, request.key, e);
                if let Some(crawl_id) = tracked {
                    self.record_failure(crawl_id, request, &e).await?;
                }
                Err(e)
            }
            Err(e) => {
                warn!(
                    "Parsing {}/{} interrupted, status left for redelivery: {}",
                    request.bucket, request.key, e
                );
                Err(e)
            }
        }
    }

    async fn run(&self, request: &ParseRequest) -> Result<ParseReport, ParseError> {
        let bytes = self
            .store
            .get(&request.bucket, &request.key)
            .await?
            .ok_or_else(|| ParseError::DocumentNotFound {
                bucket: request.bucket.clone(),
                key: request.key.clone(),
            })?;
        let html = decode_document(&bytes)?;

        let tree = self.normalizer.normalize(&html);
        let matrices = try_extract(&tree, self.limits);
        debug!("Extracted {} tables from {}", matrices.len(), request.key);

        let mut report = ParseReport {
            crawl_id: resolve_crawl_id(request),
            ..ParseReport::default()
        };

        let has_rows = matrices
            .iter()
            .any(|matrix| matrix.as_ref().is_ok_and(|m| !m.is_empty()));
        let payload = if has_rows {
            match self.extractor.extract(&tree.text_content(tree.root())).await {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Attribute extraction failed for {}: {}", request.key, e);
                    report.issues.push(DocumentIssue::AttributeExtraction {
                        message: e.to_string(),
                    });
                    None
                }
            }
        } else {
            None
        };

        for (index, matrix) in matrices.into_iter().enumerate() {
            let matrix = match matrix {
                Ok(matrix) => matrix,
                Err(e) => {
                    warn!("Skipping table {} of {}: {}", index, request.key, e);
                    counter!(TABLES_SKIPPED, "reason" => "structural_repair").increment(1);
                    report.issues.push(DocumentIssue::Table(e));
                    continue;
                }
            };
            if matrix.is_empty() {
                debug!("Skipping empty table {} of {}", index, request.key);
                counter!(TABLES_SKIPPED, "reason" => "empty").increment(1);
                continue;
            }

            match enrich(&matrix, payload.as_ref(), index) {
                Ok(enriched) => {
                    counter!(TABLES_EXTRACTED).increment(1);
                    report
                        .tables
                        .push(enriched.into_result(&report.crawl_id, index));
                }
                Err(e) => {
                    warn!("Skipping table {} of {}: {}", index, request.key, e);
                    counter!(TABLES_SKIPPED, "reason" => "enrichment").increment(1);
                    report.issues.push(DocumentIssue::Table(e));
                }
            }
        }

        if report.tables.is_empty() {
            info!("No tables found in {}/{}", request.bucket, request.key);
            return Ok(report);
        }

        match self
            .writer
            .write(request.url.as_deref(), &report.tables)
            .await
        {
            Ok(key) => report.output_key = key,
            Err(e) => {
                error!("Failed to persist results for {}: {}", request.key, e);
                report.issues.push(DocumentIssue::Persistence {
                    message: e.to_string(),
                });
            }
        }

        info!(
            "Parsed {} tables from {} ({} issues)",
            report.tables.len(),
            request.key,
            report.issues.len()
        );
        Ok(report)
    }

    async fn update_status(&self, crawl_id: &str, status: CrawlStatus) -> Result<(), ParseError> {
        match self.registry.set_status(crawl_id, status, None).await {
            Ok(()) => Ok(()),
            Err(RegistryError::InvalidTransition { from, to, .. }) => {
                warn!("Skipping status update for {}: {} -> {}", crawl_id, from, to);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    // Lands in the failure ledger so `retry_failed` re-scrapes the URL.
    async fn record_failure(
        &self,
        crawl_id: &str,
        request: &ParseRequest,
        error: &ParseError,
    ) -> Result<(), ParseError> {
        let (url, schema_type) = match self.registry.get_record(crawl_id).await? {
            Some(record) => (record.url, record.schema.schema_type),
            None => (
                request.url.clone().unwrap_or_else(|| request.key.clone()),
                SchemaType::Table,
            ),
        };
        self.registry
            .record_failure(crawl_id, &url, schema_type, &error.to_string())
            .await?;
        Ok(())
    }
}

fn resolve_crawl_id(request: &ParseRequest) -> String {
    if let Some(crawl_id) = &request.crawl_id {
        return crawl_id.clone();
    }
    if let Some(url) = &request.url {
        return crawl_id_for(url);
    }
    // Raw documents are stored as `tables_{crawl_id}.html`.
    let file_name = request.key.rsplit('/').next().unwrap_or(&request.key);
    file_name
        .strip_prefix("tables_")
        .and_then(|rest| rest.strip_suffix(".html"))
        .map(str::to_string)
        .unwrap_or_else(|| crawl_id_for(&request.key))
}
