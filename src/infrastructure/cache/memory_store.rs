// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::repositories::kv_store::{KeyValueStore, StoreError};

#[derive(Clone)]
struct StoreEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl StoreEntry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// 内存键值存储
///
/// 单进程部署和测试使用，过期时间基于 tokio 时钟，
/// 因此可以在暂停时钟的测试中推进时间验证过期行为。
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoreEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_entry(&self, key: &str) -> Option<StoreEntry> {
        let entry = self.entries.get(key)?.clone();
        if entry.is_expired() {
            self.entries.remove(key);
            debug!("Expired key evicted: {}", key);
            return None;
        }
        Some(entry)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.live_entry(key).map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .insert(key.to_string(), StoreEntry::new(value.to_string(), None));
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let entry = StoreEntry::new(value.to_string(), Some(Duration::from_secs(ttl_secs)));
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        let fresh = StoreEntry::new(value.to_string(), Some(Duration::from_secs(ttl_secs)));
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired() {
                    return Ok(false);
                }
                occupied.insert(fresh);
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(true)
            }
        }
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        if self.live_entry(key).is_none() {
            return Ok(false);
        }
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.live_entry(key).is_some())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && !entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
