// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

use crate::domain::models::attribute::{AttributeKind, AttributePayload};

/// 送入模型的文本字符上限
const MAX_INPUT_CHARS: usize = 10_000;

/// 属性提取器特质
///
/// 从文档的非结构化文本中推断分类属性词表，结果供属性合并步骤使用。
#[async_trait]
pub trait AttributeExtractor: Send + Sync {
    /// 提取属性载荷，`None` 表示该文档不做属性合并
    async fn extract(&self, document_text: &str) -> Result<Option<AttributePayload>>;
}

#[async_trait]
impl<T: AttributeExtractor + ?Sized> AttributeExtractor for Arc<T> {
    async fn extract(&self, document_text: &str) -> Result<Option<AttributePayload>> {
        (**self).extract(document_text).await
    }
}

/// 不做属性提取
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAttributeExtractor;

#[async_trait]
impl AttributeExtractor for NoAttributeExtractor {
    async fn extract(&self, _document_text: &str) -> Result<Option<AttributePayload>> {
        Ok(None)
    }
}

/// 基于LLM的属性提取器
///
/// # 功能
///
/// 把文档文本发送到兼容OpenAI的 chat completions 接口，
/// 要求模型按属性键返回字符串数组，例如
/// `{"seal_type": ["shielded"], "material_surface": ["Zinc"]}`
pub struct LlmAttributeExtractor {
    client: reqwest::Client,
    api_key: String,
    model: String,
    api_base_url: String,
}

impl LlmAttributeExtractor {
    pub fn new(api_key: String, model: String, api_base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// 描述期望输出的JSON模式
    pub fn output_schema() -> Value {
        let mut properties = Map::new();
        for kind in AttributeKind::ALL {
            properties.insert(
                kind.key().to_string(),
                json!({
                    "type": "array",
                    "items": {"type": "string"},
                    "description": kind.description(),
                }),
            );
        }
        Value::Object(properties)
    }
}

#[async_trait]
impl AttributeExtractor for LlmAttributeExtractor {
    /// 调用LLM提取属性
    ///
    /// # 参数
    /// * `document_text` - 文档的可见文本
    ///
    /// # 返回值
    /// * `Result<Option<AttributePayload>>` - 解析得到的属性载荷
    ///
    /// # 错误
    /// * 当请求失败或接口返回非成功状态时返回错误
    /// * 当模型输出不是合法JSON时返回错误
    async fn extract(&self, document_text: &str) -> Result<Option<AttributePayload>> {
        let truncated_text: String = document_text.chars().take(MAX_INPUT_CHARS).collect();
        let prompt = format!(
            "Extract data from the following text according to this JSON schema: {}. \
            Return ONLY the valid JSON object, no markdown formatting. \
            Text: {}",
            Self::output_schema(),
            truncated_text
        );

        let request_body = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a helpful data extraction assistant. You output only valid JSON."
                },
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "temperature": 0.0
        });

        let url = format!("{}/chat/completions", self.api_base_url);
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await
            .context("Failed to send request to LLM API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "LLM API returned error: {} - {}",
                status,
                error_text
            ));
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse LLM API response")?;

        if let Some(total) = body["usage"]["total_tokens"].as_u64() {
            debug!("Attribute extraction used {} tokens", total);
        }

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid response format from LLM API"))?;

        // Clean up potential markdown code blocks
        let clean_content = content
            .trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();

        let data = serde_json::from_str::<Value>(clean_content)
            .context("Failed to parse extracted JSON content")?;
        Ok(Some(AttributePayload::from_json(&data)))
    }
}
