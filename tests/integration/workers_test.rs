// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{harness, policy, urls, OUTPUT_BUCKET, TABLE_PAGE};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tablecrawl::domain::models::batch::{batch_claim_key, completion_marker_key};
use tablecrawl::domain::models::crawl_task::{crawl_id_for, CrawlStatus};
use tablecrawl::domain::repositories::kv_store::KeyValueStore;
use tablecrawl::domain::services::attribute_extractor::NoAttributeExtractor;
use tablecrawl::engines::scripted_fetcher::ScriptedFetcher;
use tablecrawl::queue::task_queue::{Job, JobKind, QueueTopic, TaskQueue};
use tablecrawl::workers::parse_worker::ParseWorker;
use tablecrawl::workers::scrape_worker::ScrapeWorker;
use tablecrawl::workers::Worker;

const PRODUCT_URL: &str = "http://shop.test/catalog/bearings/ball/deep-groove-6204";

#[tokio::test]
async fn test_workers_drive_crawl_to_parsed() {
    let h = harness(
        ScriptedFetcher::new().with_page(PRODUCT_URL, TABLE_PAGE),
        policy(10),
    );
    let scrape_worker = ScrapeWorker::new(
        h.queue.clone(),
        h.batch_scheduler.clone(),
        Duration::from_millis(10),
    );
    let parse_worker = ParseWorker::new(
        h.queue.clone(),
        Arc::new(h.parse_use_case(Arc::new(NoAttributeExtractor))),
        Duration::from_millis(10),
    );

    h.batch_scheduler
        .submit(&urls(&[PRODUCT_URL]), "table")
        .await
        .unwrap();

    assert!(scrape_worker.poll_once().await.unwrap());
    assert!(!scrape_worker.poll_once().await.unwrap());
    assert!(parse_worker.poll_once().await.unwrap());
    assert!(!parse_worker.poll_once().await.unwrap());

    assert_eq!(h.queue.in_flight(), 0);
    assert_eq!(
        h.objects.keys(OUTPUT_BUCKET).await,
        vec!["bearings/ball/deep-groove.json".to_string()]
    );
    let status = h
        .batch_scheduler
        .status(&crawl_id_for(PRODUCT_URL))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.status, CrawlStatus::Parsed);
}

#[tokio::test]
async fn test_missing_batch_is_acknowledged_not_retried() {
    let h = harness(ScriptedFetcher::new(), policy(10));
    let worker = ScrapeWorker::new(
        h.queue.clone(),
        h.batch_scheduler.clone(),
        Duration::from_millis(10),
    );
    h.task_scheduler
        .schedule_now(Job::new(JobKind::ProcessBatch {
            batch_key: "batch:gone".to_string(),
        }))
        .await
        .unwrap();

    assert!(worker.poll_once().await.unwrap());

    assert_eq!(h.queue.in_flight(), 0);
    assert_eq!(h.queue.pending(QueueTopic::Scraping).await.unwrap(), 0);
}

#[tokio::test]
async fn test_redelivered_batch_waits_for_running_delivery() {
    let h = harness(
        ScriptedFetcher::new().with_page(PRODUCT_URL, TABLE_PAGE),
        policy(10),
    );
    let worker = ScrapeWorker::new(
        h.queue.clone(),
        h.batch_scheduler.clone(),
        Duration::from_millis(10),
    );
    let first = h
        .batch_scheduler
        .submit(&urls(&[PRODUCT_URL]), "table")
        .await
        .unwrap()
        .first_batch_key
        .unwrap();

    // Given: 另一个投递仍持有该批次
    assert!(h
        .kv
        .set_nx_ex(&batch_claim_key(&first), "1", 600)
        .await
        .unwrap());

    // When: 同一批次被再次投递
    assert!(worker.poll_once().await.unwrap());

    // Then: 不抓取、不调度后继，任务留在途中等待重新投递
    assert!(h.fetcher.rendered().is_empty());
    assert_eq!(h.queue.in_flight(), 1);
    assert_eq!(h.queue.pending(QueueTopic::Parsing).await.unwrap(), 0);

    // 持有者完成后，重新投递的任务被确认而不重复处理
    h.kv.set_ex(&completion_marker_key(&first), "1", 600)
        .await
        .unwrap();
    let later = Utc::now() + chrono::Duration::seconds(61);
    assert_eq!(
        h.queue.requeue_expired(QueueTopic::Scraping, later).await.unwrap(),
        1
    );
    let delivery = h
        .queue
        .dequeue(QueueTopic::Scraping, later)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        delivery.job.kind,
        JobKind::ProcessBatch {
            batch_key: first.clone()
        }
    );
    let report = h.batch_scheduler.process_batch(&first).await.unwrap();
    assert!(report.already_completed);
    assert!(h.fetcher.rendered().is_empty());
}
