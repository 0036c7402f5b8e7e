//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的配置结构、解析逻辑以及运行时覆盖开关。

use crate::error::{CacheError, Result};
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_VERSION: u32 = 1;

/// 强制使用指定后端的环境变量
pub const ENV_FORCE_BACKEND: &str = "APPCACHE_STORAGE";
/// 关闭持久化的环境变量（值为 `false` 时生效）
pub const ENV_PERSISTENCE: &str = "APPCACHE_PERSISTENCE";
/// 版本变化时保留持久化数据的环境变量（值为 `true` 时生效）
pub const ENV_KEEP_DATA: &str = "APPCACHE_KEEP_DATA";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub config_version: Option<u32>,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

/// 应用配置
///
/// 命名空间前缀与版本戳都来自这里
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct AppConfig {
    /// 命名空间的首段
    pub app_id: String,
    /// 当前运行的应用版本，与持久化元数据中的版本比对
    pub version: String,
    /// 应用是否在线；离线时不会因为版本变化而清空持久化数据
    pub online: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_id: "appcache".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            online: true,
        }
    }
}

/// 序列化类型枚举
#[derive(Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SerializationType {
    /// JSON序列化
    #[default]
    Json,
}

/// 持久化配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct PersistenceConfig {
    /// 全局持久化策略开关
    pub enabled: bool,
    /// SQLite 连接字符串
    pub database_url: String,
    /// 写后批量刷新的静默期（毫秒）
    pub flush_quiet_ms: u64,
    /// 可持久化的最大序列化大小（字节），超出的值只保留在本次会话的内存覆盖层中
    pub max_value_size: usize,
    /// 保留缓存（`app-cache.index`）强制使用的后端 ID
    pub rescue_backend: Option<String>,
    /// 序列化类型
    pub serialization: SerializationType,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database_url: "sqlite://appcache.db?mode=rwc".to_string(),
            flush_quiet_ms: 500,
            max_value_size: 1024 * 1024, // 1MB
            rescue_backend: Some(crate::backend::durable::BACKEND_ID.to_string()),
            serialization: SerializationType::Json,
        }
    }
}

impl Config {
    /// 从TOML字符串解析配置
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(s).map_err(|e| CacheError::ConfigError(e.to_string()))?;
        config.validate().map_err(CacheError::ConfigError)?;
        Ok(config)
    }

    /// 从TOML文件加载配置
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// 验证配置
    ///
    /// 检查配置的有效性，确保所有必需的字段都已设置，并且值在合理范围内
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(version) = &self.config_version {
            if *version > CONFIG_VERSION {
                return Err(format!(
                    "Configuration version {} is not supported. Current version is {}.",
                    version, CONFIG_VERSION
                ));
            }
        }

        if self.app.version.is_empty() {
            return Err("app.version cannot be empty".to_string());
        }

        if self.app.app_id.contains("//") {
            return Err("app.app_id cannot contain '//'".to_string());
        }

        let p = &self.persistence;
        if p.database_url.is_empty() {
            return Err("persistence.database_url cannot be empty".to_string());
        }

        if !p.database_url.to_lowercase().starts_with("sqlite:") {
            return Err(format!(
                "persistence.database_url must be a sqlite connection string, got '{}'",
                p.database_url
            ));
        }

        if !(1..=60000).contains(&p.flush_quiet_ms) {
            return Err("persistence.flush_quiet_ms must be between 1 and 60000 ms".to_string());
        }

        if p.max_value_size == 0 || p.max_value_size > 100 * 1024 * 1024 {
            return Err("persistence.max_value_size must be between 1 byte and 100MB".to_string());
        }

        if let Some(rescue) = &p.rescue_backend {
            if rescue.is_empty() {
                return Err("persistence.rescue_backend cannot be empty".to_string());
            }
        }

        Ok(())
    }
}

/// 运行时覆盖开关
///
/// 启动时从运行环境读取一次，之后不再变化
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeOverrides {
    /// 强制使用的持久化后端 ID，优先于注册表计算出的首选后端
    pub force_backend: Option<String>,
    /// 强制关闭持久化
    pub disable_persistence: bool,
    /// 版本变化时保留持久化数据
    pub keep_data: bool,
}

impl RuntimeOverrides {
    /// 从进程环境变量读取覆盖开关
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 通过任意查找函数读取覆盖开关
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let force_backend = lookup(ENV_FORCE_BACKEND)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let disable_persistence = lookup(ENV_PERSISTENCE)
            .map(|v| v.trim().eq_ignore_ascii_case("false"))
            .unwrap_or(false);
        let keep_data = lookup(ENV_KEEP_DATA)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            force_backend,
            disable_persistence,
            keep_data,
        }
    }
}
