// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

/// URL与其爬取ID
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CrawlIdDto {
    pub url: String,
    pub crawl_id: String,
}

/// 抓取提交响应
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubmitResponseDto {
    pub status: String,
    pub first_batch_key: Option<String>,
    pub crawl_ids: Vec<CrawlIdDto>,
    /// 因存在失败记录而被跳过的URL
    #[serde(default)]
    pub skipped: Vec<String>,
    /// 仍在等待抓取、未重新入批的URL
    #[serde(default)]
    pub in_flight: Vec<String>,
}

/// 状态查询响应
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusResponseDto {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// 重试响应
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryResponseDto {
    pub status: String,
    pub failed_urls: Vec<String>,
    pub first_batch_key: Option<String>,
}

/// 解析任务响应
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParseResponseDto {
    pub message: String,
    pub task_id: String,
}
