//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的错误类型和处理机制。

use thiserror::Error;

/// 缓存系统错误类型枚举
///
/// 持久化后端在自身边界内吞掉存储错误，
/// 因此调用方通常只会看到配置错误和回源（getter）错误。
#[derive(Error, Debug)]
pub enum CacheError {
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// 未注册的存储后端
    #[error("Unknown storage backend: {0}")]
    UnknownBackend(String),

    /// Sea-ORM数据库错误
    #[error("Database error: {0}")]
    DbError(#[from] sea_orm::DbErr),

    /// 数据库连接错误
    #[error("Database connection error: {0}")]
    DatabaseError(String),

    /// 键匹配模式无效
    #[error("Invalid pattern: {0}")]
    PatternError(#[from] regex::Error),

    /// 回源函数执行失败
    #[error("Getter failed: {0}")]
    GetterError(String),

    /// IO错误
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// 关闭错误
    #[error("Shutdown error: {0}")]
    ShutdownError(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

/// 缓存操作结果类型别名
pub type Result<T> = std::result::Result<T, CacheError>;
