// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{harness, policy, urls, COOLDOWN_SECS, RAW_BUCKET, TABLE_PAGE, TTL_SECS};
use chrono::Utc;
use std::time::Duration;
use tablecrawl::application::use_cases::batch_scheduler::{BatchPolicy, SchedulerError};
use tablecrawl::domain::models::batch::{batch_claim_key, next_batch_pointer_key};
use tablecrawl::domain::models::crawl_task::{crawl_id_for, CrawlStatus};
use tablecrawl::domain::repositories::kv_store::KeyValueStore;
use tablecrawl::engines::scripted_fetcher::ScriptedFetcher;
use tablecrawl::queue::task_queue::{JobKind, QueueTopic, TaskQueue};

const URL_A: &str = "http://x.test/a";
const URL_B: &str = "http://x.test/b";

#[tokio::test]
async fn test_submission_chains_batches_across_cooldown() {
    let h = harness(
        ScriptedFetcher::new()
            .with_page(URL_A, TABLE_PAGE)
            .with_page(URL_B, TABLE_PAGE),
        policy(1),
    );

    // Given: 两个URL，批次大小为1
    let outcome = h
        .batch_scheduler
        .submit(&urls(&[URL_A, URL_B]), "table")
        .await
        .unwrap();
    let first = outcome.first_batch_key.clone().unwrap();
    assert_eq!(
        outcome.crawl_ids,
        vec![
            (URL_A.to_string(), crawl_id_for(URL_A)),
            (URL_B.to_string(), crawl_id_for(URL_B)),
        ]
    );
    let second = h
        .kv
        .get(&next_batch_pointer_key(&first))
        .await
        .unwrap()
        .unwrap();

    // When: 第一个批次立即可执行
    let delivery = h
        .queue
        .dequeue(QueueTopic::Scraping, Utc::now())
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
    h.queue.ack(&delivery).await.unwrap();

    // Then: 只处理了第一个URL，后继批次在冷却结束前不可见
    assert_eq!(report.scraped, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.next_batch_key.as_deref(), Some(second.as_str()));
    assert_eq!(h.fetcher.rendered(), vec![URL_A.to_string()]);
    assert!(h
        .queue
        .dequeue(QueueTopic::Scraping, Utc::now())
        .await
        .unwrap()
        .is_none());

    let after_cooldown = Utc::now() + chrono::Duration::seconds(COOLDOWN_SECS as i64 + 1);
    let delivery = h
        .queue
        .dequeue(QueueTopic::Scraping, after_cooldown)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        delivery.job.kind,
        JobKind::ProcessBatch {
            batch_key: second.clone()
        }
    );

    let report = h.batch_scheduler.process_batch(&second).await.unwrap();
    assert_eq!(report.scraped, 1);
    assert_eq!(report.next_batch_key, None);
    assert_eq!(
        h.fetcher.rendered(),
        vec![URL_A.to_string(), URL_B.to_string()]
    );

    // 每个表格页面都产生一个解析任务
    assert_eq!(h.queue.pending(QueueTopic::Parsing).await.unwrap(), 2);
    let raw_keys = h.objects.keys(RAW_BUCKET).await;
    assert!(raw_keys.contains(&format!("x_test/tables_{}.html", crawl_id_for(URL_A))));
    for url in [URL_A, URL_B] {
        let status = h.batch_scheduler.status(&crawl_id_for(url)).await.unwrap();
        assert_eq!(status.unwrap().status, CrawlStatus::Scraped);
    }
}

#[tokio::test(start_paused = true)]
async fn test_expired_batch_reports_not_found() {
    let h = harness(ScriptedFetcher::new().with_page(URL_A, TABLE_PAGE), policy(5));
    let first = h
        .batch_scheduler
        .submit(&urls(&[URL_A]), "table")
        .await
        .unwrap()
        .first_batch_key
        .unwrap();

    tokio::time::advance(Duration::from_secs(TTL_SECS + 1)).await;

    let err = h.batch_scheduler.process_batch(&first).await.unwrap_err();
    assert!(matches!(err, SchedulerError::BatchNotFound(key) if key == first));
    assert!(h.fetcher.rendered().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_successor_ttl_is_extended_while_cooling_down() {
    let h = harness(
        ScriptedFetcher::new()
            .with_page(URL_A, TABLE_PAGE)
            .with_page(URL_B, TABLE_PAGE),
        policy(1),
    );
    let first = h
        .batch_scheduler
        .submit(&urls(&[URL_A, URL_B]), "table")
        .await
        .unwrap()
        .first_batch_key
        .unwrap();

    let second = h
        .batch_scheduler
        .process_batch(&first)
        .await
        .unwrap()
        .next_batch_key
        .unwrap();

    // The original TTL alone would have expired by the end of the cooldown.
    tokio::time::advance(Duration::from_secs(COOLDOWN_SECS + 1)).await;

    let report = h.batch_scheduler.process_batch(&second).await.unwrap();
    assert_eq!(report.scraped, 1);
}

#[tokio::test]
async fn test_redelivered_batch_is_not_processed_twice() {
    let h = harness(
        ScriptedFetcher::new()
            .with_page(URL_A, TABLE_PAGE)
            .with_page(URL_B, TABLE_PAGE),
        policy(1),
    );
    let first = h
        .batch_scheduler
        .submit(&urls(&[URL_A, URL_B]), "table")
        .await
        .unwrap()
        .first_batch_key
        .unwrap();

    h.batch_scheduler.process_batch(&first).await.unwrap();
    let scheduled = h.queue.snapshot(QueueTopic::Scraping).len();

    let report = h.batch_scheduler.process_batch(&first).await.unwrap();

    assert!(report.already_completed);
    assert_eq!(report.scraped, 0);
    assert_eq!(h.fetcher.rendered(), vec![URL_A.to_string()]);
    assert_eq!(h.queue.snapshot(QueueTopic::Scraping).len(), scheduled);
}

#[tokio::test]
async fn test_failed_url_is_quarantined_and_batch_continues() {
    let h = harness(
        ScriptedFetcher::new()
            .with_navigation_error(URL_A, "net::ERR_NAME_NOT_RESOLVED")
            .with_page(URL_B, TABLE_PAGE),
        policy(10),
    );
    let first = h
        .batch_scheduler
        .submit(&urls(&[URL_A, URL_B]), "table")
        .await
        .unwrap()
        .first_batch_key
        .unwrap();

    let report = h.batch_scheduler.process_batch(&first).await.unwrap();
    assert_eq!(report.scraped, 1);
    assert_eq!(report.failed, 1);

    let status = h
        .batch_scheduler
        .status(&crawl_id_for(URL_A))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.status, CrawlStatus::Failed);
    assert!(status.error.unwrap().contains("ERR_NAME_NOT_RESOLVED"));

    // 被隔离的URL在重新提交时被跳过
    let outcome = h
        .batch_scheduler
        .submit(&urls(&[URL_A]), "table")
        .await
        .unwrap();
    assert_eq!(outcome.skipped, vec![URL_A.to_string()]);
    assert!(outcome.crawl_ids.is_empty());
    assert_eq!(outcome.first_batch_key, None);
}

#[tokio::test]
async fn test_retry_failed_resubmits_ledger_entries() {
    let h = harness(
        ScriptedFetcher::new().with_timeout(URL_A, 300),
        policy(10),
    );
    let first = h
        .batch_scheduler
        .submit(&urls(&[URL_A]), "pdf")
        .await
        .unwrap()
        .first_batch_key
        .unwrap();
    h.batch_scheduler.process_batch(&first).await.unwrap();

    let outcome = h.batch_scheduler.retry_failed().await.unwrap();

    assert_eq!(outcome.failed_urls, vec![URL_A.to_string()]);
    let retry_batch = outcome.first_batch_key.unwrap();
    assert_ne!(retry_batch, first);

    let crawl_id = crawl_id_for(URL_A);
    let registry = h.batch_scheduler.registry();
    assert!(!registry.is_quarantined(URL_A).await.unwrap());
    assert_eq!(
        registry.get_status(&crawl_id).await.unwrap().unwrap().status,
        CrawlStatus::Scraping
    );
    assert_eq!(registry.get_record(&crawl_id).await.unwrap().unwrap().retry_count, 1);

    // 重试批次保留原来的模式
    let raw = h.kv.get(&retry_batch).await.unwrap().unwrap();
    assert!(raw.contains("\"pdf\""));

    // 台账已清空，再次重试没有可提交的内容
    let again = h.batch_scheduler.retry_failed().await.unwrap();
    assert!(again.failed_urls.is_empty());
    assert_eq!(again.first_batch_key, None);
}

#[tokio::test]
async fn test_resubmission_is_idempotent() {
    let h = harness(ScriptedFetcher::new(), policy(10));

    let first = h
        .batch_scheduler
        .submit(&urls(&[URL_A, URL_A]), "table")
        .await
        .unwrap();
    let second = h
        .batch_scheduler
        .submit(&urls(&[URL_A]), "table")
        .await
        .unwrap();

    assert_eq!(first.crawl_ids.len(), 1);
    assert_eq!(first.crawl_ids, second.crawl_ids);
    assert_eq!(h.kv.keys_with_prefix("crawl_").await.unwrap().len(), 1);
    assert_eq!(h.kv.keys_with_prefix("status_").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_schema_is_rejected_before_registration() {
    let h = harness(ScriptedFetcher::new(), policy(10));

    let err = h
        .batch_scheduler
        .submit(&urls(&[URL_A]), "spreadsheet")
        .await
        .unwrap_err();

    assert!(matches!(err, SchedulerError::InvalidSchema(_)));
    assert!(h.kv.keys_with_prefix("crawl_").await.unwrap().is_empty());
    assert_eq!(h.queue.pending(QueueTopic::Scraping).await.unwrap(), 0);
}

#[tokio::test]
async fn test_html_crawls_do_not_request_parsing() {
    let h = harness(ScriptedFetcher::new().with_page(URL_A, TABLE_PAGE), policy(10));
    let first = h
        .batch_scheduler
        .submit(&urls(&[URL_A]), "html")
        .await
        .unwrap()
        .first_batch_key
        .unwrap();

    let report = h.batch_scheduler.process_batch(&first).await.unwrap();

    assert_eq!(report.scraped, 1);
    assert_eq!(h.queue.pending(QueueTopic::Parsing).await.unwrap(), 0);
    assert_eq!(
        h.objects.keys(RAW_BUCKET).await,
        vec![format!("x_test/html_{}.html", crawl_id_for(URL_A))]
    );
}

#[tokio::test(start_paused = true)]
async fn test_long_chain_survives_every_cooldown() {
    let chain: Vec<String> = (0..7).map(|i| format!("http://x.test/item-{}", i)).collect();
    let fetcher = chain
        .iter()
        .fold(ScriptedFetcher::new(), |f, url| f.with_page(url, TABLE_PAGE));
    // Seven batches outlast several multiples of the per-batch TTL.
    let h = harness(
        fetcher,
        BatchPolicy {
            size: 1,
            ttl_secs: 7200,
            cooldown_secs: 1800,
        },
    );

    let mut next = h
        .batch_scheduler
        .submit(&chain, "html")
        .await
        .unwrap()
        .first_batch_key;
    let mut processed = 0;
    while let Some(batch_key) = next {
        let report = h.batch_scheduler.process_batch(&batch_key).await.unwrap();
        assert_eq!(report.scraped, 1);
        processed += 1;
        next = report.next_batch_key;
        tokio::time::advance(Duration::from_secs(1801)).await;
    }

    assert_eq!(processed, 7);
    assert_eq!(h.fetcher.rendered(), chain);
}

#[test]
fn test_chain_ttl_grows_with_position() {
    let policy = BatchPolicy {
        size: 30,
        ttl_secs: 7200,
        cooldown_secs: 1800,
    };
    assert_eq!(policy.ttl_for(0), 7200);
    assert_eq!(policy.ttl_for(1), 7200 + 9000);
    assert_eq!(policy.ttl_for(5), 7200 + 5 * 9000);
}

#[tokio::test]
async fn test_pending_url_gets_no_second_batch() {
    let h = harness(ScriptedFetcher::new().with_page(URL_A, TABLE_PAGE), policy(10));

    let first = h
        .batch_scheduler
        .submit(&urls(&[URL_A]), "table")
        .await
        .unwrap();
    let batch_key = first.first_batch_key.clone().unwrap();

    // Given: 第一个批次还没有被处理
    let again = h
        .batch_scheduler
        .submit(&urls(&[URL_A, URL_B]), "table")
        .await
        .unwrap();

    // Then: 只有新的URL进入新批次
    assert_eq!(again.in_flight, vec![URL_A.to_string()]);
    assert_eq!(again.crawl_ids[0], (URL_A.to_string(), crawl_id_for(URL_A)));
    let second_key = again.first_batch_key.unwrap();
    let raw = h.kv.get(&second_key).await.unwrap().unwrap();
    assert!(!raw.contains(URL_A));
    assert!(raw.contains(URL_B));

    // 处理完成后可以重新提交
    h.batch_scheduler.process_batch(&batch_key).await.unwrap();
    let after = h
        .batch_scheduler
        .submit(&urls(&[URL_A]), "table")
        .await
        .unwrap();
    assert!(after.in_flight.is_empty());
    assert!(after.first_batch_key.is_some());
}

#[tokio::test]
async fn test_claimed_batch_is_not_processed_concurrently() {
    let h = harness(
        ScriptedFetcher::new()
            .with_page(URL_A, TABLE_PAGE)
            .with_page(URL_B, TABLE_PAGE),
        policy(1),
    );
    let first = h
        .batch_scheduler
        .submit(&urls(&[URL_A, URL_B]), "table")
        .await
        .unwrap()
        .first_batch_key
        .unwrap();
    let scheduled = h.queue.snapshot(QueueTopic::Scraping).len();

    // Given: 一个仍在运行的投递持有批次
    h.kv.set_nx_ex(&batch_claim_key(&first), "1", TTL_SECS)
        .await
        .unwrap();

    let err = h.batch_scheduler.process_batch(&first).await.unwrap_err();

    // Then: 没有抓取，也没有再次调度后继批次
    assert!(matches!(err, SchedulerError::BatchInProgress(key) if key == first));
    assert!(h.fetcher.rendered().is_empty());
    assert_eq!(h.queue.snapshot(QueueTopic::Scraping).len(), scheduled);
}

#[tokio::test]
async fn test_failed_run_releases_claim() {
    let h = harness(ScriptedFetcher::new(), policy(10));

    let err = h
        .batch_scheduler
        .process_batch("batch:gone")
        .await
        .unwrap_err();

    assert!(matches!(err, SchedulerError::BatchNotFound(_)));
    assert!(!h.kv.exists(&batch_claim_key("batch:gone")).await.unwrap());
}
