// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// 抓取提交请求数据传输对象
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ScrapingRequestDto {
    /// 要抓取的URL列表
    #[validate(length(min = 1, message = "urls must not be empty"))]
    pub urls: Vec<String>,
    /// 内容模式
    pub data_schema: DataSchemaDto,
}

/// 内容模式描述
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataSchemaDto {
    /// 模式类型 (table, image, html, pdf)
    #[serde(rename = "type")]
    pub schema_type: String,
    /// 期望的列名，目前仅随请求记录
    #[serde(default)]
    pub columns: Vec<String>,
}
