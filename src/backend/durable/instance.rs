//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了持久化后端的命名空间实例：写后批量落盘，读取先查覆盖层。

use super::overlay::{Overlay, OverlayRead};
use super::store::{namespaced_key, CacheStore, KEY_SEPARATOR};
use super::writer::FlushScheduler;
use super::DurableSettings;
use crate::backend::StorageInstance;
use crate::error::Result;
use crate::serialization::Serializer;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;
use tracing::{debug, error, instrument, warn};

/// 实例状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// 尚未执行任何操作
    Uninitialized,
    /// 正在打开存储
    Opening,
    /// 可正常读写
    Ready,
    /// 打开失败或后端不可用，所有操作都是空操作
    Defunct,
}

struct InstanceShared {
    namespace: String,
    /// 持久化键前缀 `{namespace}//`
    prefix: String,
    store: Option<Arc<CacheStore>>,
    settings: DurableSettings,
    state: Mutex<InstanceState>,
    opened: OnceCell<bool>,
    overlay: Mutex<Overlay>,
    /// 串行化本实例对存储的写操作
    write_gate: tokio::sync::Mutex<()>,
}

impl InstanceShared {
    fn overlay(&self) -> MutexGuard<'_, Overlay> {
        self.overlay.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: InstanceState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn durable_key(&self, key: &str) -> String {
        namespaced_key(&self.namespace, key)
    }

    /// 首次使用时打开实例，返回可用的存储
    async fn ready(&self) -> Option<&CacheStore> {
        let ok = *self
            .opened
            .get_or_init(|| async {
                self.set_state(InstanceState::Opening);
                let ok = match &self.store {
                    Some(store) => match store.ensure_entry_schema().await {
                        Ok(()) => true,
                        Err(e) => {
                            warn!("Failed to open durable cache {}: {}", self.namespace, e);
                            false
                        }
                    },
                    None => false,
                };
                self.set_state(if ok {
                    InstanceState::Ready
                } else {
                    InstanceState::Defunct
                });
                ok
            })
            .await;

        if ok {
            self.store.as_deref()
        } else {
            None
        }
    }

    fn decode(&self, key: &str, bytes: &[u8]) -> Option<Value> {
        match self.settings.serializer.deserialize::<Value>(bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                error!(
                    "Failed to deserialize cached data: key={}, cache={}, error={}",
                    key, self.namespace, e
                );
                None
            }
        }
    }

    /// 把待写入队列一次性写入存储
    async fn flush(&self) {
        let Some(store) = self.ready().await else {
            return;
        };

        let _gate = self.write_gate.lock().await;
        let batch = self.overlay().take_pending();
        if batch.is_empty() {
            return;
        }

        let rows: Vec<(String, Vec<u8>)> = batch
            .iter()
            .map(|(key, bytes)| (self.durable_key(key), bytes.clone()))
            .collect();

        match store.put_batch(&rows).await {
            Ok(()) => debug!("durable flush: cache={}, entries={}", self.namespace, rows.len()),
            Err(e) => {
                let restored = self.overlay().requeue(batch);
                error!(
                    "durable flush failed: cache={}, entries={}, requeued={}, error={}",
                    self.namespace,
                    rows.len(),
                    restored,
                    e
                );
            }
        }
    }
}

/// 持久化后端的命名空间实例
pub struct DurableInstance {
    shared: Arc<InstanceShared>,
    scheduler: FlushScheduler,
}

impl DurableInstance {
    pub(super) fn new(
        namespace: &str,
        store: Option<Arc<CacheStore>>,
        settings: DurableSettings,
    ) -> Self {
        let quiet = settings.flush_quiet;
        let shared = Arc::new(InstanceShared {
            namespace: namespace.to_string(),
            prefix: format!("{}{}", namespace, KEY_SEPARATOR),
            store,
            settings,
            state: Mutex::new(InstanceState::Uninitialized),
            opened: OnceCell::new(),
            overlay: Mutex::new(Overlay::default()),
            write_gate: tokio::sync::Mutex::new(()),
        });

        let worker = shared.clone();
        let scheduler = FlushScheduler::start(namespace.to_string(), quiet, move || {
            let worker = worker.clone();
            async move { worker.flush().await }
        });

        Self { shared, scheduler }
    }

    pub fn namespace(&self) -> &str {
        &self.shared.namespace
    }

    pub fn state(&self) -> InstanceState {
        *self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// 待写入队列长度
    pub fn pending_len(&self) -> usize {
        self.shared.overlay().pending_len()
    }

    /// 不等静默期，立即落盘
    pub async fn flush_now(&self) {
        self.shared.flush().await;
    }

    /// 停止后台刷新任务（会执行最后一次刷新）
    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
    }
}

#[async_trait]
impl StorageInstance for DurableInstance {
    #[instrument(skip(self), level = "debug", fields(ns = %self.shared.namespace))]
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let shared = &self.shared;
        let Some(store) = shared.ready().await else {
            return Ok(None);
        };

        let (read, seen) = {
            let overlay = shared.overlay();
            (overlay.read(key), overlay.changes())
        };
        match read {
            OverlayRead::Removed => return Ok(None),
            OverlayRead::Cached(bytes) => return Ok(shared.decode(key, &bytes)),
            OverlayRead::Unknown => {}
        }

        match store.get(&shared.durable_key(key)).await {
            Ok(Some(bytes)) => {
                if shared.decode(key, &bytes).is_none() {
                    return Ok(None);
                }
                let current = shared.overlay().fill(key, bytes, seen);
                match current {
                    OverlayRead::Cached(bytes) => Ok(shared.decode(key, &bytes)),
                    _ => Ok(None),
                }
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!("durable read failed: key={}, cache={}, error={}", key, shared.namespace, e);
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, value), level = "debug", fields(ns = %self.shared.namespace))]
    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        let shared = &self.shared;
        if shared.ready().await.is_none() {
            return Ok(());
        }

        let bytes = match shared.settings.serializer.serialize(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Could not serialize: key={}, cache={}, error={}", key, shared.namespace, e);
                return Ok(());
            }
        };

        let persist = bytes.len() <= shared.settings.max_value_size;
        if !persist {
            debug!(
                "value exceeds durable size limit, kept for this session only: key={}, size={}",
                key,
                bytes.len()
            );
        }

        shared.overlay().write(key, bytes, persist);
        if persist {
            self.scheduler.schedule();
        }
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(ns = %self.shared.namespace))]
    async fn remove(&self, key: &str) -> Result<()> {
        let shared = &self.shared;
        let Some(store) = shared.ready().await else {
            return Ok(());
        };

        shared.overlay().remove(key);

        let _gate = shared.write_gate.lock().await;
        match store.delete(&shared.durable_key(key)).await {
            Ok(()) => shared.overlay().confirm_removed(key),
            Err(e) => warn!(
                "durable delete failed, keeping tombstone: key={}, cache={}, error={}",
                key, shared.namespace, e
            ),
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let shared = &self.shared;
        let Some(store) = shared.ready().await else {
            return Ok(Vec::new());
        };

        let stored = match store.keys_with_prefix(&shared.prefix).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("durable key scan failed: cache={}, error={}", shared.namespace, e);
                Vec::new()
            }
        };

        let overlay = shared.overlay();
        let mut seen = HashSet::new();
        let stored = stored.into_iter().filter(|_| !overlay.is_masked());
        let keys = stored
            .chain(overlay.keys().cloned())
            .filter(|key| !overlay.is_tombstoned(key))
            .filter(|key| seen.insert(key.clone()))
            .collect();
        Ok(keys)
    }

    #[instrument(skip(self), level = "debug", fields(ns = %self.shared.namespace))]
    async fn clear(&self) -> Result<()> {
        let shared = &self.shared;
        let Some(store) = shared.ready().await else {
            return Ok(());
        };

        let marked = shared.overlay().clear();

        let _gate = shared.write_gate.lock().await;
        match store.delete_prefix(&shared.prefix).await {
            Ok(removed) => {
                shared.overlay().confirm_cleared(&marked);
                debug!("durable clear: cache={}, rows={}", shared.namespace, removed);
            }
            Err(e) => warn!(
                "durable clear failed, keeping in-memory state: cache={}, error={}",
                shared.namespace, e
            ),
        }
        Ok(())
    }
}
