//! appcache - 客户端可插拔键值缓存库
//!
//! 按命名缓存在持久化后端（SQLite 写后批量存储）和临时后端（内存）之间路由，
//! 提供带时间戳的值缓存与按对象派生键的对象缓存。

#![doc(html_root_url = "https://docs.rs/appcache/0.1.0")]

pub use serde;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use tokio;

pub mod backend;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod manager;
pub mod registry;
pub mod serialization;
pub mod storage;
pub mod telemetry;

// Re-export commonly used items
pub use backend::{MemoryBackend, SqliteBackend, StorageBackend, StorageInstance};
pub use client::{
    default_key_generator, CacheEntry, KeyGenerator, Lookup, ObjectCache, Pattern, SimpleCache,
};
pub use config::{Config, RuntimeOverrides};
pub use error::{CacheError, Result};
pub use manager::CacheManager;
pub use registry::BackendRegistry;
pub use storage::{CacheStorage, Session, StorageOptions};

/// appcache 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
