// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::models::table::StructuredResult;
use crate::domain::repositories::object_store::StorageError;

/// 结果持久化错误
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to serialize workbook: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to upload {key}: {source}")]
    Upload {
        key: String,
        #[source]
        source: StorageError,
    },
}

/// 结构化结果写入器
///
/// 一个文档的所有表格被写成一个工作簿
#[async_trait]
pub trait ResultWriter: Send + Sync {
    /// 写入工作簿
    ///
    /// # 参数
    ///
    /// * `url` - 源页面URL，用于推导输出路径
    /// * `results` - 文档中每个表格的结构化结果
    ///
    /// # 返回值
    ///
    /// * `Ok(Some(key))` - 写入的对象键
    /// * `Ok(None)` - 没有可写入的表格
    /// * `Err(PersistenceError)` - 序列化或上传失败
    async fn write(
        &self,
        url: Option<&str>,
        results: &[StructuredResult],
    ) -> Result<Option<String>, PersistenceError>;
}

#[async_trait]
impl<T: ResultWriter + ?Sized> ResultWriter for Arc<T> {
    async fn write(
        &self,
        url: Option<&str>,
        results: &[StructuredResult],
    ) -> Result<Option<String>, PersistenceError> {
        (**self).write(url, results).await
    }
}
