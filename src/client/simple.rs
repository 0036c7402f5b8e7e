//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了值缓存：字符串键到带时间戳条目的映射，支持回源读取和按模式批量操作。

use super::{now_millis, CacheEntry, Lookup, Pattern};
use crate::error::{CacheError, Result};
use crate::storage::{CacheStorage, RouterContext, StorageOptions};
use futures::future::{join_all, try_join_all};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// 值缓存
///
/// 条目以 `{ data, timestamp }` 的形式保存在名为 `{name}.index` 的缓存路由中
pub struct SimpleCache {
    name: String,
    index: CacheStorage,
}

impl SimpleCache {
    /// 创建值缓存
    ///
    /// # 参数
    ///
    /// * `ctx` - 路由上下文
    /// * `name` - 缓存名称，不能为空
    /// * `persistent` - 是否请求持久化
    ///
    /// # 返回值
    ///
    /// 名称为空时返回配置错误
    pub fn new(ctx: Arc<RouterContext>, name: &str, persistent: bool) -> Result<Self> {
        Self::with_options(ctx, name, persistent, StorageOptions::default())
    }

    /// 创建值缓存并指定后端
    pub fn with_options(
        ctx: Arc<RouterContext>,
        name: &str,
        persistent: bool,
        options: StorageOptions,
    ) -> Result<Self> {
        if name.is_empty() {
            return Err(CacheError::ConfigError(
                "each cache needs a unique name".to_string(),
            ));
        }
        let index = CacheStorage::new(ctx, &format!("{}.index", name), persistent, options)?;
        Ok(Self {
            name: name.to_string(),
            index,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 底层缓存路由
    pub fn storage(&self) -> &CacheStorage {
        &self.index
    }

    /// 读取完整条目；记录结构不符时视为未命中
    pub(crate) async fn entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let Some(stored) = self.index.get(key).await? else {
            return Ok(None);
        };
        match CacheEntry::from_stored(stored) {
            Some(entry) => Ok(Some(entry)),
            None => {
                warn!("malformed cache entry: cache={}, key={}", self.name, key);
                Ok(None)
            }
        }
    }

    /// 读取缓存值
    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.get_with(key, Lookup::new()).await
    }

    /// 读取缓存值，未命中时调用加载函数
    ///
    /// 加载函数的结果不会写入缓存；命中时通知回调会收到缓存值
    #[instrument(skip(self, lookup), level = "debug", fields(cache = %self.name))]
    pub async fn get_with(&self, key: &str, lookup: Lookup) -> Result<Option<Value>> {
        match self.entry(key).await? {
            Some(entry) => Ok(lookup.hit(entry.data)),
            None => lookup.miss().await,
        }
    }

    /// 读取并反序列化为指定类型
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// 写入缓存值
    ///
    /// 已有条目的时间戳更新时不覆盖，返回已有数据；否则写入并返回新数据
    ///
    /// # 参数
    ///
    /// * `key` - 缓存键
    /// * `data` - 数据
    /// * `timestamp` - 毫秒时间戳，缺省为当前时间
    #[instrument(skip(self, data), level = "debug", fields(cache = %self.name))]
    pub async fn add(&self, key: &str, data: Value, timestamp: Option<i64>) -> Result<Value> {
        let timestamp = timestamp.unwrap_or_else(now_millis);

        if let Some(existing) = self.entry(key).await? {
            if existing.timestamp > timestamp {
                debug!(
                    "stale add ignored: cache={}, key={}, stored={}, incoming={}",
                    self.name, key, existing.timestamp, timestamp
                );
                return Ok(existing.data);
            }
        }

        let entry = CacheEntry::new(data, timestamp);
        self.index.set(key, &serde_json::to_value(&entry)?).await?;
        Ok(entry.data)
    }

    /// 序列化后写入
    pub async fn add_as<T>(&self, key: &str, data: &T, timestamp: Option<i64>) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let stored = self.add(key, serde_json::to_value(data)?, timestamp).await?;
        Ok(serde_json::from_value(stored)?)
    }

    /// 条目时间戳，不存在时为 0
    pub async fn time(&self, key: &str) -> Result<i64> {
        Ok(self.entry(key).await?.map_or(0, |e| e.timestamp))
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        self.index.remove(key).await
    }

    /// 并发删除多个键
    pub async fn remove_many<S: AsRef<str>>(&self, keys: &[S]) -> Result<()> {
        try_join_all(keys.iter().map(|k| self.index.remove(k.as_ref()))).await?;
        Ok(())
    }

    /// 删除所有匹配模式的键，返回删除数量
    pub async fn grep_remove(&self, pattern: impl Into<Pattern>) -> Result<usize> {
        let matched = self.grep_keys(pattern).await?;
        self.remove_many(&matched).await?;
        Ok(matched.len())
    }

    pub async fn keys(&self) -> Result<Vec<String>> {
        self.index.keys().await
    }

    /// 列出匹配模式的键
    pub async fn grep_keys(&self, pattern: impl Into<Pattern>) -> Result<Vec<String>> {
        let re = pattern.into().to_regex()?;
        let keys = self.index.keys().await?;
        Ok(keys.into_iter().filter(|k| re.is_match(k)).collect())
    }

    /// 所有条目的数据
    ///
    /// 列出键之后被删除的条目会被跳过
    pub async fn values(&self) -> Result<Vec<Value>> {
        let keys = self.index.keys().await?;
        let entries = join_all(keys.iter().map(|k| self.entry(k))).await;

        let mut values = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(entry) = entry? {
                values.push(entry.data);
            }
        }
        Ok(values)
    }

    pub async fn size(&self) -> Result<usize> {
        Ok(self.index.keys().await?.len())
    }

    pub async fn clear(&self) -> Result<()> {
        self.index.clear().await
    }
}
