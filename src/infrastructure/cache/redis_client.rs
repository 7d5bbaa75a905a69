// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::domain::repositories::kv_store::{KeyValueStore, StoreError};

/// Redis客户端
///
/// 提供对Redis数据库的异步操作接口，
/// 既作为键值存储，也为任务队列提供有序集合操作
#[derive(Clone)]
pub struct RedisClient {
    /// Redis客户端
    client: redis::Client,
}

impl RedisClient {
    /// 创建新的Redis客户端实例
    ///
    /// # 参数
    ///
    /// * `redis_url` - Redis连接URL
    ///
    /// # 返回值
    ///
    /// * `Ok(RedisClient)` - Redis客户端实例
    /// * `Err(StoreError)` - URL无效
    pub fn new(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// 向有序集合添加成员
    ///
    /// # 参数
    ///
    /// * `key` - 有序集合键
    /// * `member` - 成员
    /// * `score` - 分数（任务队列中为可执行时间的毫秒时间戳）
    pub async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), StoreError> {
        let mut con = self.connection().await?;
        con.zadd::<_, _, _, ()>(key, member, score).await?;
        Ok(())
    }

    /// 读取分数不超过 `max_score` 的前 `count` 个成员
    pub async fn zrange_due(
        &self,
        key: &str,
        max_score: i64,
        count: isize,
    ) -> Result<Vec<String>, StoreError> {
        let mut con = self.connection().await?;
        let members: Vec<String> = con
            .zrangebyscore_limit(key, "-inf", max_score, 0, count)
            .await?;
        Ok(members)
    }

    /// 从有序集合删除成员，返回是否确实删除
    ///
    /// 多个消费者竞争同一成员时只有一个会得到 `true`
    pub async fn zrem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut con = self.connection().await?;
        let removed: i64 = con.zrem(key, member).await?;
        Ok(removed > 0)
    }

    /// 有序集合的成员数量
    pub async fn zcard(&self, key: &str) -> Result<u64, StoreError> {
        let mut con = self.connection().await?;
        let count: u64 = con.zcard(key).await?;
        Ok(count)
    }
}

#[async_trait]
impl KeyValueStore for RedisClient {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut con = self.connection().await?;
        let value: Option<String> = con.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut con = self.connection().await?;
        con.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let mut con = self.connection().await?;
        con.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        let mut con = self.connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut con)
            .await?;
        Ok(reply.is_some())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        let mut con = self.connection().await?;
        let applied: bool = con.expire(key, ttl_secs as i64).await?;
        Ok(applied)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut con = self.connection().await?;
        con.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut con = self.connection().await?;
        let exists: bool = con.exists(key).await?;
        Ok(exists)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut con = self.connection().await?;
        let mut keys: Vec<String> = con.keys(format!("{}*", prefix)).await?;
        keys.sort();
        Ok(keys)
    }
}
