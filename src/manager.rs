//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存管理器，负责组装后端注册表并向调用方分发命名缓存。

use crate::backend::{MemoryBackend, SqliteBackend, StorageBackend};
use crate::client::{KeyGenerator, ObjectCache, SimpleCache};
use crate::config::{Config, RuntimeOverrides};
use crate::error::{CacheError, Result};
use crate::registry::BackendRegistry;
use crate::storage::{RouterContext, Session};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, instrument};

/// 缓存管理器
///
/// 一个会话对应一个管理器。管理器持有注册表和路由上下文，
/// 同名缓存共享同一个后端实例
pub struct CacheManager {
    config: Config,
    ctx: Arc<RouterContext>,
    durable: Arc<SqliteBackend>,
}

impl CacheManager {
    /// 初始化缓存管理器
    ///
    /// # 参数
    ///
    /// * `config` - 缓存系统配置
    /// * `session` - 当前会话身份
    /// * `overrides` - 运行时覆盖开关
    ///
    /// # 返回值
    ///
    /// 配置无效时返回错误；持久化存储打不开不算错误，缓存会退化为临时存储
    #[instrument(skip_all, level = "info", fields(app_id = %config.app.app_id))]
    pub async fn new(config: Config, session: Session, overrides: RuntimeOverrides) -> Result<Self> {
        config.validate().map_err(CacheError::ConfigError)?;

        let durable = SqliteBackend::open(&config.persistence, &config.app, &overrides).await;

        let mut registry = BackendRegistry::new(overrides.force_backend.clone());
        registry.register(Arc::new(MemoryBackend::new()));
        registry.register(durable.clone() as Arc<dyn StorageBackend>);

        let ctx = Arc::new(RouterContext {
            registry: Arc::new(registry),
            app_id: config.app.app_id.clone(),
            session,
            persistence_enabled: AtomicBool::new(config.persistence.enabled),
            persistence_disabled_by_override: overrides.disable_persistence,
            rescue_backend: config.persistence.rescue_backend.clone(),
        });

        info!(
            "cache manager ready: durable={}, persistence={}, user={}",
            durable.is_usable(),
            config.persistence.enabled && !overrides.disable_persistence,
            ctx.session.is_authenticated()
        );

        Ok(Self {
            config,
            ctx,
            durable,
        })
    }

    /// 使用进程环境变量中的覆盖开关初始化
    pub async fn from_env(config: Config, session: Session) -> Result<Self> {
        Self::new(config, session, RuntimeOverrides::from_env()).await
    }

    /// 获取对象缓存
    ///
    /// # 参数
    ///
    /// * `name` - 缓存名称，不能为空
    /// * `persistent` - 是否请求持久化
    /// * `key_generator` - 键生成函数，缺省使用默认规则
    pub fn get_cache(
        &self,
        name: &str,
        persistent: bool,
        key_generator: Option<KeyGenerator>,
    ) -> Result<ObjectCache> {
        let inner = self.simple_cache(name, persistent)?;
        Ok(ObjectCache::new(inner, key_generator))
    }

    /// 获取值缓存
    pub fn simple_cache(&self, name: &str, persistent: bool) -> Result<SimpleCache> {
        SimpleCache::new(self.ctx.clone(), name, persistent)
    }

    /// 切换全局持久化策略，对已创建的缓存立即生效
    pub fn set_persistence_enabled(&self, enabled: bool) {
        info!("persistence policy changed: enabled={}", enabled);
        self.ctx.persistence_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn persistence_enabled(&self) -> bool {
        self.ctx.persistence_enabled()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn context(&self) -> &Arc<RouterContext> {
        &self.ctx
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.ctx.registry
    }

    /// 持久化后端
    pub fn durable_backend(&self) -> &Arc<SqliteBackend> {
        &self.durable
    }

    /// 清空所有后端的数据（例如注销时）
    #[instrument(skip(self), level = "info")]
    pub async fn clear_all(&self) -> Result<()> {
        self.ctx.registry.clear_all().await
    }

    /// 立即落盘所有待写入数据
    pub async fn flush(&self) -> Result<()> {
        self.ctx.registry.flush_all().await
    }

    /// 停止所有后台刷新任务，停止前会执行最后一次刷新
    #[instrument(skip(self), level = "info")]
    pub async fn shutdown(&self) -> Result<()> {
        info!("shutting down cache manager");
        self.ctx.registry.shutdown().await
    }
}
