//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存路由：按命名缓存决定每次操作走持久化后端还是临时后端。

use crate::backend::durable::store::KEY_SEPARATOR;
use crate::backend::{StorageBackend, StorageInstance};
use crate::error::{CacheError, Result};
use crate::registry::BackendRegistry;
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// 需要在临时后端下也能找回的内部索引缓存
static RESERVED_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"app-cache\.index$").expect("valid reserved cache name pattern"));

/// 会话身份
///
/// 用户与语言在会话中不会变化，命名空间在创建缓存时确定
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// 已登录用户，空字符串表示匿名
    pub user: String,
    pub locale: String,
}

impl Session {
    pub fn new(user: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            locale: locale.into(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !self.user.is_empty()
    }
}

/// 路由所需的共享上下文
pub struct RouterContext {
    pub registry: Arc<BackendRegistry>,
    pub app_id: String,
    pub session: Session,
    /// 全局持久化策略，可在运行时切换
    pub persistence_enabled: AtomicBool,
    /// 运行时覆盖：强制关闭持久化
    pub persistence_disabled_by_override: bool,
    /// 保留缓存强制使用的后端
    pub rescue_backend: Option<String>,
}

impl RouterContext {
    pub fn persistence_enabled(&self) -> bool {
        self.persistence_enabled.load(Ordering::SeqCst)
    }
}

/// 单个缓存的后端选择
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    /// 持久化后端 ID，缺省为注册表的首选后端
    pub persistent: Option<String>,
    /// 临时后端 ID，缺省为注册表的临时后端
    pub fluent: Option<String>,
}

/// 拼接命名空间：`appId.user.locale.name`，忽略空段
pub fn namespace_for(app_id: &str, session: &Session, name: &str) -> String {
    [app_id, session.user.as_str(), session.locale.as_str(), name]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(".")
}

/// 缓存路由
///
/// 自身不保存数据，所有调用都转发给当前选中的后端实例
pub struct CacheStorage {
    name: String,
    namespace: String,
    persistent_requested: bool,
    ctx: Arc<RouterContext>,
    persistent: Option<Arc<dyn StorageBackend>>,
    fluent: Arc<dyn StorageBackend>,
    /// 保留缓存：无视全局策略，固定使用指定后端
    rescued: bool,
    durable_instance: OnceCell<Arc<dyn StorageInstance>>,
    transient_instance: OnceCell<Arc<dyn StorageInstance>>,
}

impl CacheStorage {
    /// 创建缓存路由
    ///
    /// # 参数
    ///
    /// * `ctx` - 共享上下文
    /// * `name` - 缓存名称
    /// * `persistent` - 是否请求持久化
    /// * `options` - 后端选择
    pub fn new(
        ctx: Arc<RouterContext>,
        name: &str,
        persistent: bool,
        mut options: StorageOptions,
    ) -> Result<Self> {
        let registry = &ctx.registry;

        for segment in [name, ctx.session.user.as_str(), ctx.session.locale.as_str()] {
            if segment.contains(KEY_SEPARATOR) {
                return Err(CacheError::ConfigError(format!(
                    "cache namespace segment cannot contain '{}': {}",
                    KEY_SEPARATOR, segment
                )));
            }
        }

        let mut rescued = false;
        if RESERVED_NAME.is_match(name) {
            if let Some(rescue) = ctx.rescue_backend.as_deref() {
                if registry.get(rescue).is_some_and(|b| b.is_usable()) {
                    options.persistent = Some(rescue.to_string());
                    rescued = true;
                }
            }
        }

        let persistent_backend = match &options.persistent {
            Some(id) => Some(
                registry
                    .get(id)
                    .ok_or_else(|| CacheError::UnknownBackend(id.clone()))?,
            ),
            None => registry.preferred(),
        };

        let fluent = match &options.fluent {
            Some(id) => registry
                .get(id)
                .ok_or_else(|| CacheError::UnknownBackend(id.clone()))?,
            None => registry.transient()?,
        };

        let namespace = namespace_for(&ctx.app_id, &ctx.session, name);
        debug!(
            "cache storage created: name={}, namespace={}, persistent={}, rescued={}",
            name, namespace, persistent, rescued
        );

        Ok(Self {
            name: name.to_string(),
            namespace,
            persistent_requested: persistent,
            ctx,
            persistent: persistent_backend,
            fluent,
            rescued,
            durable_instance: OnceCell::new(),
            transient_instance: OnceCell::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// 当前是否使用持久化后端
    pub fn uses_persistence(&self) -> bool {
        let Some(backend) = &self.persistent else {
            return false;
        };
        if !backend.is_usable() {
            return false;
        }
        if self.rescued {
            return true;
        }
        self.persistent_requested
            && self.ctx.persistence_enabled()
            && !self.ctx.persistence_disabled_by_override
            && self.ctx.session.is_authenticated()
    }

    /// 当前选中的后端 ID
    pub fn backend_id(&self) -> &str {
        match &self.persistent {
            Some(backend) if self.uses_persistence() => backend.id(),
            _ => self.fluent.id(),
        }
    }

    fn layer(&self) -> &Arc<dyn StorageInstance> {
        match &self.persistent {
            Some(backend) if self.uses_persistence() => self
                .durable_instance
                .get_or_init(|| backend.instance(&self.namespace)),
            _ => self
                .transient_instance
                .get_or_init(|| self.fluent.instance(&self.namespace)),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.layer().get(key).await
    }

    pub async fn set(&self, key: &str, value: &Value) -> Result<()> {
        self.layer().set(key, value).await
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        self.layer().remove(key).await
    }

    pub async fn keys(&self) -> Result<Vec<String>> {
        self.layer().keys().await
    }

    pub async fn clear(&self) -> Result<()> {
        self.layer().clear().await
    }
}
