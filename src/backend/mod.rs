//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了存储后端的契约：后端本身（注册与可用性）以及按命名空间划分的实例（读写操作）。

pub mod durable;
pub mod memory;

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub use durable::SqliteBackend;
pub use memory::MemoryBackend;

/// 命名空间实例
///
/// 一个命名空间内的键值操作。所有方法都是异步的，不会阻塞调用方
#[async_trait]
pub trait StorageInstance: Send + Sync {
    /// 读取键对应的值，不存在时返回 None
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// 写入键值
    async fn set(&self, key: &str, value: &Value) -> Result<()>;

    /// 删除键，键不存在时为空操作
    async fn remove(&self, key: &str) -> Result<()>;

    /// 列出命名空间内的所有键
    async fn keys(&self) -> Result<Vec<String>>;

    /// 清空命名空间
    async fn clear(&self) -> Result<()>;
}

/// 存储后端
///
/// 每个后端为每个命名空间维护至多一个存活实例
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// 后端 ID，用于注册表查找与运行时覆盖
    fn id(&self) -> &str;

    /// 优先级，数值越小越优先
    fn rank(&self) -> u32;

    /// 写入是否跨会话保留
    fn is_durable(&self) -> bool;

    /// 后端当前是否可用
    fn is_usable(&self) -> bool;

    /// 获取（必要时创建）命名空间实例
    fn instance(&self, namespace: &str) -> Arc<dyn StorageInstance>;

    /// 清空后端内所有命名空间的数据
    async fn clear(&self) -> Result<()>;

    /// 立即落盘所有待写入数据
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// 停止后台任务并释放资源
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
