// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// 存储错误类型
#[derive(Error, Debug)]
pub enum StorageError {
    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// 存储错误
    #[error("Storage error: {0}")]
    Other(String),
}

/// 对象存储特质
///
/// 原始文档和结构化结果都以 `(bucket, key)` 寻址
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// 保存对象
    async fn put(&self, bucket: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// 读取对象，不存在时返回 `None`
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// 删除对象
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError>;

    /// 检查对象是否存在
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError>;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    async fn put(&self, bucket: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        (**self).put(bucket, key, data).await
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).get(bucket, key).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        (**self).delete(bucket, key).await
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        (**self).exists(bucket, key).await
    }
}
