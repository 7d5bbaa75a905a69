// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// 键值存储错误类型
#[derive(Error, Debug)]
pub enum StoreError {
    /// 后端连接或命令执行失败
    #[error("Key-value backend error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// 键值存储特质
///
/// 调度器和注册表通过它访问外部键值服务，只使用简单的读写语义，没有事务。
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// 读取键值
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// 永久写入键值
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// 写入键值并设置过期时间（秒）
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError>;

    /// 仅在键不存在时写入并设置过期时间
    ///
    /// 写入成功返回 `true`，键已存在时返回 `false` 且不修改原值
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, StoreError>;

    /// 重新设置已有键的过期时间，键不存在时返回 `false`
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError>;

    /// 删除键
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// 检查键是否存在
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// 列出所有以指定前缀开头的键
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value).await
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        (**self).set_nx_ex(key, value, ttl_secs).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        (**self).set_ex(key, value, ttl_secs).await
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        (**self).expire(key, ttl_secs).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        (**self).exists(key).await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        (**self).keys_with_prefix(prefix).await
    }
}
