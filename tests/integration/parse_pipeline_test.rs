// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{harness, policy, urls, OUTPUT_BUCKET, RAW_BUCKET, TABLE_PAGE};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tablecrawl::application::use_cases::parse_document::{
    ParseDocumentUseCase, ParseError, ParseRequest,
};
use tablecrawl::domain::models::crawl_task::{crawl_id_for, CrawlStatus, SchemaType};
use tablecrawl::domain::repositories::object_store::{ObjectStore, StorageError};
use tablecrawl::domain::services::attribute_extractor::NoAttributeExtractor;
use tablecrawl::domain::services::normalizer::{Normalizer, TbodyStrategy};
use tablecrawl::domain::services::table_extractor::ExtractLimits;
use tablecrawl::infrastructure::result_writer::JsonWorkbookWriter;
use tablecrawl::infrastructure::storage::InMemoryStorage;
use tablecrawl::engines::scripted_fetcher::ScriptedFetcher;
use tablecrawl::infrastructure::result_writer::Workbook;
use tablecrawl::queue::task_queue::{JobKind, QueueTopic, TaskQueue};

const PRODUCT_URL: &str = "http://shop.test/catalog/bearings/ball/deep-groove-6204";

fn raw_request(key: &str) -> ParseRequest {
    ParseRequest {
        bucket: RAW_BUCKET.to_string(),
        key: key.to_string(),
        url: None,
        crawl_id: None,
    }
}

#[tokio::test]
async fn test_scraped_table_page_is_parsed_into_workbook() {
    let h = harness(
        ScriptedFetcher::new().with_page(PRODUCT_URL, TABLE_PAGE),
        policy(10),
    );
    let use_case = h.parse_use_case(Arc::new(NoAttributeExtractor));

    // Given: 表格页面已经抓取并写入原始文档
    let first = h
        .batch_scheduler
        .submit(&urls(&[PRODUCT_URL]), "table")
        .await
        .unwrap()
        .first_batch_key
        .unwrap();
    h.batch_scheduler.process_batch(&first).await.unwrap();

    // When: 消费解析任务
    let delivery = h
        .queue
        .dequeue(QueueTopic::Parsing, Utc::now())
        .await
        .unwrap()
        .unwrap();
    let JobKind::ParseDocument {
        bucket,
        key,
        url,
        crawl_id,
    } = delivery.job.kind.clone()
    else {
        panic!("expected a parse job, got {:?}", delivery.job.kind);
    };
    assert_eq!(key, format!("shop_test/tables_{}.html", crawl_id_for(PRODUCT_URL)));

    let report = use_case
        .execute(&ParseRequest {
            bucket,
            key,
            url,
            crawl_id,
        })
        .await
        .unwrap();

    // Then: 一个表格，结果写到由URL路径推导出的位置
    assert_eq!(report.crawl_id, crawl_id_for(PRODUCT_URL));
    assert_eq!(report.tables.len(), 1);
    assert!(report.issues.is_empty());
    let table = &report.tables[0];
    assert_eq!(table.columns, vec!["Part", "Size"]);
    assert!(table.rows.contains(&vec!["6204".to_string(), "20 mm".to_string()]));

    let output_key = report.output_key.clone().unwrap();
    assert_eq!(output_key, "bearings/ball/deep-groove.json");
    let bytes = h.objects.get(OUTPUT_BUCKET, &output_key).await.unwrap().unwrap();
    let workbook: Workbook = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(workbook.sheets.len(), 1);
    assert_eq!(workbook.sheets[0].name, "Table_1");
    assert_eq!(workbook.source_url.as_deref(), Some(PRODUCT_URL));

    let status = h
        .batch_scheduler
        .status(&crawl_id_for(PRODUCT_URL))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.status, CrawlStatus::Parsed);
}

#[tokio::test]
async fn test_parsing_is_deterministic() {
    let h = harness(ScriptedFetcher::new(), policy(10));
    let use_case = h.parse_use_case(Arc::new(NoAttributeExtractor));
    h.objects
        .put(RAW_BUCKET, "shop_test/tables_abc.html", TABLE_PAGE.as_bytes())
        .await
        .unwrap();

    let first = use_case
        .execute(&raw_request("shop_test/tables_abc.html"))
        .await
        .unwrap();
    let second = use_case
        .execute(&raw_request("shop_test/tables_abc.html"))
        .await
        .unwrap();

    assert_eq!(first.crawl_id, "abc");
    assert_eq!(first.tables, second.tables);
}

#[tokio::test]
async fn test_document_without_tables_yields_empty_result() {
    let h = harness(ScriptedFetcher::new(), policy(10));
    let use_case = h.parse_use_case(Arc::new(NoAttributeExtractor));
    h.objects
        .put(
            RAW_BUCKET,
            "shop_test/tables_none.html",
            b"<html><body><p>Out of stock</p></body></html>",
        )
        .await
        .unwrap();

    let report = use_case
        .execute(&raw_request("shop_test/tables_none.html"))
        .await
        .unwrap();

    assert!(report.tables.is_empty());
    assert_eq!(report.output_key, None);
    assert!(h.objects.keys(OUTPUT_BUCKET).await.is_empty());
}

#[tokio::test]
async fn test_empty_table_keeps_sheet_numbering() {
    let h = harness(ScriptedFetcher::new(), policy(10));
    let use_case = h.parse_use_case(Arc::new(NoAttributeExtractor));
    let html = format!("<html><body><table></table>{}</body></html>", TABLE_PAGE);
    h.objects
        .put(RAW_BUCKET, "shop_test/tables_two.html", html.as_bytes())
        .await
        .unwrap();

    let report = use_case
        .execute(&ParseRequest {
            url: Some("http://shop.test/catalog/bearings/needle".to_string()),
            ..raw_request("shop_test/tables_two.html")
        })
        .await
        .unwrap();

    assert_eq!(report.tables.len(), 1);
    assert_eq!(report.tables[0].table_index, 1);

    let bytes = h
        .objects
        .get(OUTPUT_BUCKET, "bearings/needle/needle.json")
        .await
        .unwrap()
        .unwrap();
    let workbook: Workbook = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(workbook.sheets[0].name, "Table_2");
}

#[tokio::test]
async fn test_missing_document_fails_the_crawl() {
    let h = harness(ScriptedFetcher::new(), policy(10));
    let use_case = h.parse_use_case(Arc::new(NoAttributeExtractor));
    let crawl_id = h
        .batch_scheduler
        .registry()
        .register(PRODUCT_URL, SchemaType::Table)
        .await
        .unwrap()
        .crawl_id;

    let err = use_case
        .execute(&ParseRequest {
            crawl_id: Some(crawl_id.clone()),
            ..raw_request("shop_test/missing.html")
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ParseError::DocumentNotFound { .. }));
    let status = h.batch_scheduler.status(&crawl_id).await.unwrap().unwrap();
    assert_eq!(status.status, CrawlStatus::Failed);
    assert!(status.error.unwrap().contains("shop_test/missing.html"));
}

#[tokio::test]
async fn test_missing_document_lands_in_failure_ledger() {
    let h = harness(ScriptedFetcher::new(), policy(10));
    let use_case = h.parse_use_case(Arc::new(NoAttributeExtractor));
    let registry = h.batch_scheduler.registry();
    let crawl_id = registry
        .register(PRODUCT_URL, SchemaType::Table)
        .await
        .unwrap()
        .crawl_id;

    // Given: 原始文档已经不存在
    use_case
        .execute(&ParseRequest {
            url: Some(PRODUCT_URL.to_string()),
            crawl_id: Some(crawl_id.clone()),
            ..raw_request("shop_test/missing.html")
        })
        .await
        .unwrap_err();

    // Then: 失败台账包含该URL，重试会重新提交它
    assert!(registry.is_quarantined(PRODUCT_URL).await.unwrap());
    let entries = registry.failed_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].crawl_id, crawl_id);
    assert_eq!(entries[0].record.url, PRODUCT_URL);
    assert_eq!(entries[0].record.schema_type, SchemaType::Table);

    let retry = h.batch_scheduler.retry_failed().await.unwrap();
    assert_eq!(retry.failed_urls, vec![PRODUCT_URL.to_string()]);
    assert!(retry.first_batch_key.is_some());
}

/// 第一次读取失败、之后正常的对象存储
struct FlakyStorage {
    inner: Arc<InMemoryStorage>,
    failed_once: AtomicBool,
}

#[async_trait]
impl ObjectStore for FlakyStorage {
    async fn put(&self, bucket: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.inner.put(bucket, key, data).await
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        if !self.failed_once.swap(true, Ordering::SeqCst) {
            return Err(StorageError::Other("connection reset".to_string()));
        }
        self.inner.get(bucket, key).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.inner.delete(bucket, key).await
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        self.inner.exists(bucket, key).await
    }
}

#[tokio::test]
async fn test_transient_read_error_recovers_on_redelivery() {
    let h = harness(ScriptedFetcher::new(), policy(10));
    let registry = h.batch_scheduler.registry();
    let crawl_id = registry
        .register(PRODUCT_URL, SchemaType::Table)
        .await
        .unwrap()
        .crawl_id;
    registry
        .set_status(&crawl_id, CrawlStatus::Scraped, None)
        .await
        .unwrap();
    let key = format!("shop_test/tables_{}.html", crawl_id);
    h.objects
        .put(RAW_BUCKET, &key, TABLE_PAGE.as_bytes())
        .await
        .unwrap();

    let store = Arc::new(FlakyStorage {
        inner: h.objects.clone(),
        failed_once: AtomicBool::new(false),
    });
    let use_case = ParseDocumentUseCase::new(
        store,
        registry.clone(),
        Arc::new(NoAttributeExtractor),
        Arc::new(JsonWorkbookWriter::new(h.objects.clone(), OUTPUT_BUCKET)),
        Normalizer::new(TbodyStrategy::Merge),
        ExtractLimits::default(),
    );
    let request = ParseRequest {
        url: Some(PRODUCT_URL.to_string()),
        crawl_id: Some(crawl_id.clone()),
        ..raw_request(&key)
    };

    // When: 第一次执行遇到存储错误
    let err = use_case.execute(&request).await.unwrap_err();
    assert!(!err.is_terminal());
    let status = registry.get_status(&crawl_id).await.unwrap().unwrap();
    assert_eq!(status.status, CrawlStatus::Parsing);
    assert!(!registry.is_quarantined(PRODUCT_URL).await.unwrap());

    // Then: 重新投递后正常完成
    let report = use_case.execute(&request).await.unwrap();
    assert_eq!(report.tables.len(), 1);
    let status = registry.get_status(&crawl_id).await.unwrap().unwrap();
    assert_eq!(status.status, CrawlStatus::Parsed);
    assert_eq!(status.error, None);
}
