// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{harness, policy, TABLE_PAGE};
use axum::http::StatusCode;
use serde_json::{json, Value};
use tablecrawl::domain::models::crawl_task::crawl_id_for;
use tablecrawl::engines::scripted_fetcher::ScriptedFetcher;
use tablecrawl::queue::task_queue::{JobKind, QueueTopic, TaskQueue};

const URL_A: &str = "http://x.test/a";

#[tokio::test]
async fn test_health_and_version() {
    let server = harness(ScriptedFetcher::new(), policy(10)).server();

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), "OK");

    let response = server.get("/v1/version").await;
    assert_eq!(response.text(), env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_submit_returns_crawl_ids() {
    let h = harness(ScriptedFetcher::new().with_page(URL_A, TABLE_PAGE), policy(10));
    let server = h.server();

    let response = server
        .post("/scraping-data/")
        .json(&json!({
            "urls": [URL_A],
            "data_schema": {"type": "table", "columns": ["Part", "Size"]}
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(body["status"], "Batch processing started");
    assert_eq!(body["crawl_ids"][0]["url"], URL_A);
    assert_eq!(body["crawl_ids"][0]["crawl_id"], crawl_id_for(URL_A));
    assert!(body["first_batch_key"].as_str().unwrap().starts_with("batch:"));
    assert_eq!(h.queue.pending(QueueTopic::Scraping).await.unwrap(), 1);
}

#[tokio::test]
async fn test_invalid_schema_is_bad_request() {
    let server = harness(ScriptedFetcher::new(), policy(10)).server();

    let response = server
        .post("/scraping-data/")
        .json(&json!({"urls": [URL_A], "data_schema": {"type": "spreadsheet"}}))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("spreadsheet"));
}

#[tokio::test]
async fn test_empty_url_list_is_bad_request() {
    let server = harness(ScriptedFetcher::new(), policy(10)).server();

    let response = server
        .post("/scraping-data/")
        .json(&json!({"urls": [], "data_schema": {"type": "table"}}))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_of_known_and_unknown_crawls() {
    let h = harness(ScriptedFetcher::new(), policy(10));
    let server = h.server();
    server
        .post("/scraping-data/")
        .json(&json!({"urls": [URL_A], "data_schema": {"type": "html"}}))
        .await;

    let response = server.get(&format!("/status/{}", crawl_id_for(URL_A))).await;
    assert_eq!(response.json::<Value>(), json!({"status": "scraping"}));

    let response = server.get("/status/does-not-exist").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(
        response.json::<Value>(),
        json!({"status": "unknown", "message": "Crawl ID not found"})
    );
}

#[tokio::test]
async fn test_retry_failed_reports_urls() {
    let h = harness(
        ScriptedFetcher::new().with_navigation_error(URL_A, "connection reset"),
        policy(10),
    );
    let server = h.server();
    let first = h
        .batch_scheduler
        .submit(&[URL_A.to_string()], "table")
        .await
        .unwrap()
        .first_batch_key
        .unwrap();
    h.batch_scheduler.process_batch(&first).await.unwrap();

    let response = server.get(&format!("/status/{}", crawl_id_for(URL_A))).await;
    let body: Value = response.json();
    assert_eq!(body["status"], "failed");
    assert!(body["error"].as_str().unwrap().contains("connection reset"));

    let response = server.post("/retry-failed/").await;
    let body: Value = response.json();
    assert_eq!(body["status"], "Retry initiated");
    assert_eq!(body["failed_urls"], json!([URL_A]));

    let response = server.post("/retry-failed/").await;
    let body: Value = response.json();
    assert_eq!(body["status"], "No failed URLs to retry");
}

#[tokio::test]
async fn test_start_parse_enqueues_job_for_nested_key() {
    let h = harness(ScriptedFetcher::new(), policy(10));
    let server = h.server();

    let response = server
        .post("/start-parse/raw-documents/shop_test/tables_abc.html")
        .await;

    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(body["message"], "Parse task started");

    let jobs = h.queue.snapshot(QueueTopic::Parsing);
    assert_eq!(jobs.len(), 1);
    assert_eq!(body["task_id"], jobs[0].id.to_string());
    assert_eq!(
        jobs[0].kind,
        JobKind::ParseDocument {
            bucket: "raw-documents".to_string(),
            key: "shop_test/tables_abc.html".to_string(),
            url: None,
            crawl_id: None,
        }
    );
}
