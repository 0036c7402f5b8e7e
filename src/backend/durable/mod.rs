//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了持久化后端：基于 SQLite 的写后批量存储，带进程内覆盖层与版本迁移。
//!
//! 后端打开时会读取元数据表中的版本戳。应用版本变化（且在线、没有保留数据的覆盖开关）时，
//! 所有命名空间的持久化数据都会被清空。旧版本写入的数据结构被视为不可复用。

pub mod instance;
pub mod overlay;
pub mod store;
pub mod writer;

pub use instance::{DurableInstance, InstanceState};
pub use store::{namespaced_key, CacheStore, MetaRecord};

use super::{StorageBackend, StorageInstance};
use crate::config::{AppConfig, PersistenceConfig, RuntimeOverrides, SerializationType};
use crate::error::Result;
use crate::serialization::{JsonSerializer, SerializerEnum};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

pub const BACKEND_ID: &str = "sqlite";

/// 持久化实例共用的设置
#[derive(Debug, Clone)]
pub struct DurableSettings {
    /// 写后刷新的静默期
    pub flush_quiet: Duration,
    /// 可持久化的最大序列化大小（字节）
    pub max_value_size: usize,
    pub serializer: SerializerEnum,
}

impl From<&PersistenceConfig> for DurableSettings {
    fn from(config: &PersistenceConfig) -> Self {
        Self {
            flush_quiet: Duration::from_millis(config.flush_quiet_ms),
            max_value_size: config.max_value_size,
            serializer: match config.serialization {
                SerializationType::Json => SerializerEnum::Json(JsonSerializer::new()),
            },
        }
    }
}

/// SQLite 持久化后端
pub struct SqliteBackend {
    store: Option<Arc<CacheStore>>,
    defunct: AtomicBool,
    settings: DurableSettings,
    instances: DashMap<String, Arc<DurableInstance>>,
}

impl SqliteBackend {
    /// 打开持久化后端
    ///
    /// 打开失败不会返回错误，而是得到一个不可用的后端，缓存会退化为临时存储
    ///
    /// # 参数
    ///
    /// * `persistence` - 持久化配置
    /// * `app` - 应用配置（版本、在线状态）
    /// * `overrides` - 运行时覆盖开关
    #[instrument(skip_all, level = "info", name = "open_durable_backend")]
    pub async fn open(
        persistence: &PersistenceConfig,
        app: &AppConfig,
        overrides: &RuntimeOverrides,
    ) -> Arc<Self> {
        let settings = DurableSettings::from(persistence);

        let store = match Self::connect(&persistence.database_url).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                warn!("Failed to use durable cache store: {}", e);
                return Arc::new(Self::unusable(settings));
            }
        };

        let backend = Arc::new(Self {
            store: Some(store.clone()),
            defunct: AtomicBool::new(false),
            settings,
            instances: DashMap::new(),
        });

        if let Err(e) = backend.reconcile_version(&store, app, overrides).await {
            warn!("Failed to use durable cache store, version check failed: {}", e);
            backend.defunct.store(true, Ordering::SeqCst);
        }

        backend
    }

    /// 创建一个不可用的后端
    pub fn unusable(settings: DurableSettings) -> Self {
        Self {
            store: None,
            defunct: AtomicBool::new(true),
            settings,
            instances: DashMap::new(),
        }
    }

    async fn connect(database_url: &str) -> Result<CacheStore> {
        let store = CacheStore::connect(database_url).await?;
        let version = store.probe().await?;
        store.ensure_meta_schema().await?;
        store.ensure_entry_schema().await?;
        info!("durable cache store opened, sqlite {}", version);
        Ok(store)
    }

    /// 版本戳检查，必要时清空所有命名空间
    async fn reconcile_version(
        &self,
        store: &CacheStore,
        app: &AppConfig,
        overrides: &RuntimeOverrides,
    ) -> Result<()> {
        let meta = match store.get_meta().await? {
            None => {
                return store
                    .put_meta(&MetaRecord {
                        version: app.version.clone(),
                        clean_up: false,
                    })
                    .await;
            }
            Some(meta) => meta,
        };

        let stale = meta.version != app.version || meta.clean_up;
        if !(stale && app.online && !overrides.keep_data) {
            return Ok(());
        }

        warn!(
            "Clearing persistent caches due to version change: {} -> {}",
            meta.version, app.version
        );
        store
            .put_meta(&MetaRecord {
                version: meta.version,
                clean_up: true,
            })
            .await?;
        self.destroy(store).await?;
        store
            .put_meta(&MetaRecord {
                version: app.version.clone(),
                clean_up: false,
            })
            .await
    }

    /// 清空所有命名空间：先清每个存活实例，再删除存储中的全部记录
    async fn destroy(&self, store: &CacheStore) -> Result<()> {
        for instance in self.live_instances() {
            instance.clear().await?;
        }
        let removed = store.delete_all().await?;
        info!("durable cache store wiped, {} records removed", removed);
        Ok(())
    }

    fn live_instances(&self) -> Vec<Arc<DurableInstance>> {
        self.instances.iter().map(|e| e.value().clone()).collect()
    }

    /// 获取具体类型的命名空间实例
    pub fn durable_instance(&self, namespace: &str) -> Arc<DurableInstance> {
        let store = if self.is_usable() {
            self.store.clone()
        } else {
            None
        };
        self.instances
            .entry(namespace.to_string())
            .or_insert_with(|| {
                Arc::new(DurableInstance::new(
                    namespace,
                    store,
                    self.settings.clone(),
                ))
            })
            .clone()
    }

    /// 底层存储（后端不可用时为 None）
    pub fn store(&self) -> Option<&CacheStore> {
        if self.is_usable() {
            self.store.as_deref()
        } else {
            None
        }
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    fn id(&self) -> &str {
        BACKEND_ID
    }

    fn rank(&self) -> u32 {
        100
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn is_usable(&self) -> bool {
        !self.defunct.load(Ordering::SeqCst)
    }

    fn instance(&self, namespace: &str) -> Arc<dyn StorageInstance> {
        self.durable_instance(namespace)
    }

    async fn clear(&self) -> Result<()> {
        match self.store() {
            Some(store) => self.destroy(store).await,
            None => Ok(()),
        }
    }

    async fn flush(&self) -> Result<()> {
        for instance in self.live_instances() {
            instance.flush_now().await;
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        for instance in self.live_instances() {
            instance.shutdown().await;
        }
        Ok(())
    }
}
