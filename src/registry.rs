//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了存储后端注册表：按优先级排列后端，并选出首选的持久化后端。

use crate::backend::{memory, StorageBackend};
use crate::error::{CacheError, Result};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::{info, warn};

/// 存储后端注册表
///
/// 首选持久化后端在第一次查询时计算，之后在注册表生命周期内保持不变
pub struct BackendRegistry {
    backends: Vec<Arc<dyn StorageBackend>>,
    forced: Option<String>,
    preferred: OnceCell<Option<String>>,
}

impl BackendRegistry {
    /// 创建空注册表
    ///
    /// # 参数
    ///
    /// * `forced` - 运行时强制使用的后端 ID，优先于计算出的首选后端
    pub fn new(forced: Option<String>) -> Self {
        Self {
            backends: Vec::new(),
            forced,
            preferred: OnceCell::new(),
        }
    }

    /// 注册后端；同 ID 的后端会被替换
    pub fn register(&mut self, backend: Arc<dyn StorageBackend>) {
        if self.preferred.get().is_some() {
            warn!(
                "backend {} registered after the preferred backend was chosen",
                backend.id()
            );
        }
        self.backends.retain(|b| b.id() != backend.id());
        self.backends.push(backend);
        self.backends.sort_by_key(|b| b.rank());
    }

    /// 按优先级列出所有后端
    pub fn list(&self) -> &[Arc<dyn StorageBackend>] {
        &self.backends
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn StorageBackend>> {
        self.backends.iter().find(|b| b.id() == id).cloned()
    }

    /// 临时后端
    pub fn transient(&self) -> Result<Arc<dyn StorageBackend>> {
        self.get(memory::BACKEND_ID)
            .or_else(|| self.backends.iter().find(|b| !b.is_durable()).cloned())
            .ok_or_else(|| CacheError::UnknownBackend(memory::BACKEND_ID.to_string()))
    }

    /// 首选持久化后端的 ID
    ///
    /// 没有可用的持久化后端时返回 None
    pub fn preferred_id(&self) -> Option<&str> {
        self.preferred
            .get_or_init(|| {
                if let Some(forced) = &self.forced {
                    info!("storage backend forced by override: {}", forced);
                    return Some(forced.clone());
                }
                let chosen = self
                    .backends
                    .iter()
                    .find(|b| b.is_durable() && b.is_usable())
                    .map(|b| b.id().to_string());
                match &chosen {
                    Some(id) => info!("preferred durable backend: {}", id),
                    None => warn!("no usable durable backend, caches are transient"),
                }
                chosen
            })
            .as_deref()
    }

    /// 首选持久化后端
    pub fn preferred(&self) -> Option<Arc<dyn StorageBackend>> {
        self.preferred_id().and_then(|id| self.get(id))
    }

    /// 清空所有可用后端的数据
    pub async fn clear_all(&self) -> Result<()> {
        for backend in self.backends.iter().filter(|b| b.is_usable()) {
            backend.clear().await?;
        }
        Ok(())
    }

    /// 立即落盘所有后端的待写入数据
    pub async fn flush_all(&self) -> Result<()> {
        for backend in &self.backends {
            backend.flush().await?;
        }
        Ok(())
    }

    /// 关闭所有后端，逐个尝试并汇总错误
    pub async fn shutdown(&self) -> Result<()> {
        let mut errors = Vec::new();
        for backend in &self.backends {
            if let Err(e) = backend.shutdown().await {
                warn!("关闭后端 {} 时出错: {}", backend.id(), e);
                errors.push(format!("{}: {}", backend.id(), e));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CacheError::ShutdownError(format!(
                "部分后端关闭失败: {}",
                errors.join(", ")
            )))
        }
    }
}
