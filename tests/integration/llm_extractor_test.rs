// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{harness, policy, RAW_BUCKET};
use serde_json::json;
use std::sync::Arc;
use tablecrawl::application::use_cases::parse_document::{DocumentIssue, ParseRequest};
use tablecrawl::domain::models::attribute::AttributeKind;
use tablecrawl::domain::repositories::object_store::ObjectStore;
use tablecrawl::domain::services::attribute_extractor::{AttributeExtractor, LlmAttributeExtractor};
use tablecrawl::engines::scripted_fetcher::ScriptedFetcher;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MATERIAL_TABLE: &str = r#"<html><body>
<p>Available in stainless steel and zinc plated finishes.</p>
<table>
  <thead><tr><th>Part</th><th>Size</th></tr></thead>
  <tbody>
    <tr><td>Stainless Steel</td><td>-</td></tr>
    <tr><td>P1</td><td>10</td></tr>
    <tr><td>P2</td><td>12</td></tr>
    <tr><td>Zinc</td><td>-</td></tr>
    <tr><td>P3</td><td>8</td></tr>
  </tbody>
</table>
</body></html>"#;

fn completion(content: &str) -> serde_json::Value {
    json!({
        "choices": [{"message": {"role": "assistant", "content": content}}],
        "usage": {"total_tokens": 42}
    })
}

async fn mock_llm(content: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(content)))
        .mount(&server)
        .await;
    server
}

fn extractor(server: &MockServer) -> LlmAttributeExtractor {
    LlmAttributeExtractor::new(
        "test-key".to_string(),
        "gpt-test".to_string(),
        format!("{}/", server.uri()),
    )
}

#[tokio::test]
async fn test_llm_reply_in_code_fence_is_parsed() {
    let server = mock_llm("```json\n{\"material_surface\": [\"Stainless Steel\", \"Zinc\"]}\n```").await;

    let payload = extractor(&server)
        .extract("Stainless Steel and Zinc parts")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(payload.keys(), vec![AttributeKind::MaterialSurface.key()]);
    assert_eq!(
        payload.sets[0].vocabulary,
        vec!["Stainless Steel".to_string(), "Zinc".to_string()]
    );
}

#[tokio::test]
async fn test_llm_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let err = extractor(&server).extract("text").await.unwrap_err();
    assert!(err.to_string().contains("429"));
}

#[tokio::test]
async fn test_category_markers_become_attribute_column() {
    let server = mock_llm(r#"{"material_surface": ["Stainless Steel", "Zinc"]}"#).await;
    let h = harness(ScriptedFetcher::new(), policy(10));
    let use_case = h.parse_use_case(Arc::new(extractor(&server)));
    h.objects
        .put(RAW_BUCKET, "shop_test/tables_m.html", MATERIAL_TABLE.as_bytes())
        .await
        .unwrap();

    let report = use_case
        .execute(&ParseRequest {
            bucket: RAW_BUCKET.to_string(),
            key: "shop_test/tables_m.html".to_string(),
            url: None,
            crawl_id: None,
        })
        .await
        .unwrap();

    assert!(report.issues.is_empty());
    let table = &report.tables[0];
    assert_eq!(table.columns, vec!["Part", "Size", "material_surface"]);
    let body: Vec<(String, String)> = table
        .rows
        .iter()
        .skip(1)
        .map(|row| (row[0].clone(), row[2].clone()))
        .collect();
    assert_eq!(
        body,
        vec![
            ("P1".to_string(), "Stainless Steel".to_string()),
            ("P2".to_string(), "Stainless Steel".to_string()),
            ("P3".to_string(), "Zinc".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_failed_extraction_is_recorded_and_tables_kept() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("not json at all")))
        .mount(&server)
        .await;
    let h = harness(ScriptedFetcher::new(), policy(10));
    let use_case = h.parse_use_case(Arc::new(extractor(&server)));
    h.objects
        .put(RAW_BUCKET, "shop_test/tables_m.html", MATERIAL_TABLE.as_bytes())
        .await
        .unwrap();

    let report = use_case
        .execute(&ParseRequest {
            bucket: RAW_BUCKET.to_string(),
            key: "shop_test/tables_m.html".to_string(),
            url: None,
            crawl_id: None,
        })
        .await
        .unwrap();

    assert_eq!(report.tables.len(), 1);
    assert_eq!(report.tables[0].columns, vec!["Part", "Size"]);
    assert!(matches!(
        report.issues.as_slice(),
        [DocumentIssue::AttributeExtraction { .. }]
    ));
}
