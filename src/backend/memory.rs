//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了临时（内存）后端的实现，数据在进程结束后丢失。

use super::{StorageBackend, StorageInstance};
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use moka::future::Cache;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

pub const BACKEND_ID: &str = "memory";

/// 临时后端
///
/// 每个命名空间对应一个独立的 Moka 缓存，不设容量上限也不过期
#[derive(Default)]
pub struct MemoryBackend {
    instances: DashMap<String, Arc<MemoryInstance>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn id(&self) -> &str {
        BACKEND_ID
    }

    fn rank(&self) -> u32 {
        1000
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn is_usable(&self) -> bool {
        true
    }

    fn instance(&self, namespace: &str) -> Arc<dyn StorageInstance> {
        self.instances
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(MemoryInstance::new(namespace)))
            .clone()
    }

    #[instrument(skip(self), level = "debug")]
    async fn clear(&self) -> Result<()> {
        let instances: Vec<Arc<MemoryInstance>> =
            self.instances.iter().map(|e| e.value().clone()).collect();
        for instance in instances {
            instance.clear().await?;
        }
        Ok(())
    }
}

/// 临时后端的命名空间实例
pub struct MemoryInstance {
    namespace: String,
    cache: Cache<String, Value>,
}

impl MemoryInstance {
    fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            cache: Cache::builder().build(),
        }
    }
}

#[async_trait]
impl StorageInstance for MemoryInstance {
    #[instrument(skip(self), level = "debug", fields(ns = %self.namespace))]
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let value = self.cache.get(key).await;
        debug!("memory get: key={}, found={}", key, value.is_some());
        Ok(value)
    }

    #[instrument(skip(self, value), level = "debug", fields(ns = %self.namespace))]
    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        self.cache.insert(key.to_string(), value.clone()).await;
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(ns = %self.namespace))]
    async fn remove(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.cache.iter().map(|(k, _)| k.as_ref().clone()).collect())
    }

    #[instrument(skip(self), level = "debug", fields(ns = %self.namespace))]
    async fn clear(&self) -> Result<()> {
        // 逐个失效，保证随后的 keys() 立即看不到旧条目
        let keys: Vec<Arc<String>> = self.cache.iter().map(|(k, _)| k).collect();
        for key in keys {
            self.cache.invalidate(key.as_ref()).await;
        }
        debug!("memory clear: namespace={}", self.namespace);
        Ok(())
    }
}
