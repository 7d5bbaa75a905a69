// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
};
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::{
    application::dto::{
        crawl_response::{CrawlIdDto, RetryResponseDto, StatusResponseDto, SubmitResponseDto},
        scraping_request::ScrapingRequestDto,
    },
    application::use_cases::batch_scheduler::BatchScheduler,
    presentation::errors::AppError,
};

/// 提交抓取请求
///
/// 校验模式类型，注册每个URL并创建批次链
pub async fn submit_scraping(
    Extension(scheduler): Extension<Arc<BatchScheduler>>,
    Json(payload): Json<ScrapingRequestDto>,
) -> Result<(StatusCode, Json<SubmitResponseDto>), AppError> {
    payload.validate()?;

    let outcome = scheduler
        .submit(&payload.urls, &payload.data_schema.schema_type)
        .await?;

    let status = if outcome.first_batch_key.is_some() {
        "Batch processing started"
    } else if !outcome.in_flight.is_empty() {
        "All URLs are already queued"
    } else {
        "No valid URLs to process (all failed previously)"
    };
    info!(
        "Accepted {} URLs, skipped {}, already queued {}",
        outcome.crawl_ids.len(),
        outcome.skipped.len(),
        outcome.in_flight.len()
    );

    let response = SubmitResponseDto {
        status: status.to_string(),
        first_batch_key: outcome.first_batch_key,
        crawl_ids: outcome
            .crawl_ids
            .into_iter()
            .map(|(url, crawl_id)| CrawlIdDto { url, crawl_id })
            .collect(),
        skipped: outcome.skipped,
        in_flight: outcome.in_flight,
    };
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// 查询爬取状态
pub async fn get_status(
    Extension(scheduler): Extension<Arc<BatchScheduler>>,
    Path(crawl_id): Path<String>,
) -> Result<Json<StatusResponseDto>, AppError> {
    let response = match scheduler.status(&crawl_id).await? {
        Some(record) => StatusResponseDto {
            status: record.status.to_string(),
            error: record.error,
            message: None,
        },
        None => StatusResponseDto {
            status: "unknown".to_string(),
            error: None,
            message: Some("Crawl ID not found".to_string()),
        },
    };
    Ok(Json(response))
}

/// 重新提交失败台账中的所有URL
pub async fn retry_failed(
    Extension(scheduler): Extension<Arc<BatchScheduler>>,
) -> Result<Json<RetryResponseDto>, AppError> {
    let outcome = scheduler.retry_failed().await?;

    let status = if outcome.failed_urls.is_empty() {
        "No failed URLs to retry"
    } else {
        "Retry initiated"
    };
    Ok(Json(RetryResponseDto {
        status: status.to_string(),
        failed_urls: outcome.failed_urls,
        first_batch_key: outcome.first_batch_key,
    }))
}
