//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了对象缓存：由对象本身派生缓存键，支持批量写入、合并与去重。

use super::{now_millis, Lookup, Pattern, SimpleCache};
use crate::error::Result;
use futures::future::{join_all, try_join_all};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// 缓存键生成函数，无法生成键时返回 None
pub type KeyGenerator = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// 合并时永远不会被覆盖的字段
const PRESERVED_FIELD: &str = "last_modified";

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn key_segment(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 默认键生成规则：`{folder_id || folder || 0}.{id}`
///
/// 对象带 `data` 字段时使用其内容。非对象或缺少 `id` 时不生成键
pub fn default_key_generator(value: &Value) -> Option<String> {
    let object = value.as_object()?;
    let object = match object.get("data") {
        Some(data) => data.as_object()?,
        None => object,
    };

    let id = object.get("id").filter(|id| !id.is_null())?;
    let folder = ["folder_id", "folder"]
        .iter()
        .filter_map(|field| object.get(*field))
        .find(|v| is_truthy(v))
        .map(key_segment)
        .unwrap_or_else(|| "0".to_string());

    Some(format!("{}.{}", folder, key_segment(id)))
}

/// 对象缓存
pub struct ObjectCache {
    inner: SimpleCache,
    key_generator: KeyGenerator,
}

impl ObjectCache {
    /// 创建对象缓存
    ///
    /// # 参数
    ///
    /// * `inner` - 底层值缓存
    /// * `key_generator` - 键生成函数，缺省使用 [`default_key_generator`]
    pub fn new(inner: SimpleCache, key_generator: Option<KeyGenerator>) -> Self {
        Self {
            inner,
            key_generator: key_generator
                .unwrap_or_else(|| Arc::new(default_key_generator) as KeyGenerator),
        }
    }

    /// 底层值缓存，用于按原始键操作
    pub fn simple(&self) -> &SimpleCache {
        &self.inner
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// 用当前的键生成函数计算对象的缓存键
    pub fn key_for(&self, value: &Value) -> Option<String> {
        (self.key_generator)(value)
    }

    /// 字符串和数字直接作为键，其余交给键生成函数
    fn resolve_key(&self, value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            other => self.key_for(other),
        }
    }

    pub async fn get(&self, value: &Value) -> Result<Option<Value>> {
        self.get_with(value, Lookup::new()).await
    }

    /// 读取对象
    ///
    /// 数组会并发读取每个成员：只要有一个未命中就调用一次加载函数并返回其结果，
    /// 全部命中时按顺序返回数组
    #[instrument(skip_all, level = "debug", fields(cache = %self.name()))]
    pub async fn get_with(&self, value: &Value, lookup: Lookup) -> Result<Option<Value>> {
        if let Value::Array(members) = value {
            let found = try_join_all(members.iter().map(|m| self.get_one(m))).await?;
            let all: Option<Vec<Value>> = found.into_iter().collect();
            return match all {
                Some(values) => Ok(lookup.hit(Value::Array(values))),
                None => lookup.miss().await,
            };
        }

        match self.resolve_key(value) {
            Some(key) => self.inner.get_with(&key, lookup).await,
            None => lookup.miss().await,
        }
    }

    async fn get_one(&self, value: &Value) -> Result<Option<Value>> {
        match self.resolve_key(value) {
            Some(key) => self.inner.get(&key).await,
            None => Ok(None),
        }
    }

    /// 写入对象，返回生成的键
    ///
    /// 数组成员共用一个时间戳，结果中去掉无法生成键的成员
    #[instrument(skip_all, level = "debug", fields(cache = %self.name()))]
    pub async fn add(&self, value: &Value, timestamp: Option<i64>) -> Result<Vec<String>> {
        let timestamp = timestamp.unwrap_or_else(now_millis);
        match value {
            Value::Array(members) => {
                let keys =
                    try_join_all(members.iter().map(|m| self.add_one(m, timestamp))).await?;
                Ok(keys.into_iter().flatten().collect())
            }
            other => Ok(self.add_one(other, timestamp).await?.into_iter().collect()),
        }
    }

    async fn add_one(&self, value: &Value, timestamp: i64) -> Result<Option<String>> {
        let Some(key) = self.key_for(value) else {
            debug!("no cache key for value, skipped: cache={}", self.name());
            return Ok(None);
        };
        self.inner.add(&key, value.clone(), Some(timestamp)).await?;
        Ok(Some(key))
    }

    /// 把部分字段合并进已缓存的对象
    ///
    /// 返回是否有字段发生变化。`last_modified` 的差异计入变化但不会写入
    #[instrument(skip_all, level = "debug", fields(cache = %self.name()))]
    pub async fn merge(&self, value: &Value, timestamp: Option<i64>) -> Result<bool> {
        let timestamp = timestamp.unwrap_or_else(now_millis);
        match value {
            Value::Array(members) => {
                let changed =
                    try_join_all(members.iter().map(|m| self.merge_one(m, timestamp))).await?;
                Ok(changed.into_iter().any(|c| c))
            }
            other => self.merge_one(other, timestamp).await,
        }
    }

    async fn merge_one(&self, partial: &Value, timestamp: i64) -> Result<bool> {
        let (Some(key), Some(fields)) = (self.key_for(partial), partial.as_object()) else {
            return Ok(false);
        };
        let Some(Value::Object(mut target)) = self.inner.get(&key).await? else {
            return Ok(false);
        };

        if !apply_fields(&mut target, fields) {
            return Ok(false);
        }

        self.inner
            .add(&key, Value::Object(target), Some(timestamp))
            .await?;
        Ok(true)
    }

    /// 删除对象
    ///
    /// 数组成员并发删除，单个失败只记录日志
    #[instrument(skip_all, level = "debug", fields(cache = %self.name()))]
    pub async fn remove(&self, value: &Value) -> Result<()> {
        if let Value::Array(members) = value {
            let keys: Vec<String> = members.iter().filter_map(|m| self.resolve_key(m)).collect();
            let results = join_all(keys.iter().map(|k| self.inner.remove(k))).await;
            for (key, result) in keys.iter().zip(results) {
                if let Err(e) = result {
                    error!("failed to remove cache entry: cache={}, key={}, error={}", self.name(), key, e);
                }
            }
            return Ok(());
        }

        match self.resolve_key(value) {
            Some(key) => self.inner.remove(&key).await,
            None => Ok(()),
        }
    }

    /// 缓存中的对象与传入对象的指定字段不同时删除缓存条目
    ///
    /// 返回是否删除了条目
    pub async fn dedust(&self, value: &Value, property: &str) -> Result<bool> {
        let Some(key) = self.key_for(value) else {
            return Ok(false);
        };
        let Some(stored) = self.inner.get(&key).await? else {
            return Ok(false);
        };

        if stored.get(property) == value.get(property) {
            return Ok(false);
        }
        self.inner.remove(&key).await?;
        Ok(true)
    }

    /// 对象的写入时间戳，未缓存时为 0
    pub async fn time(&self, value: &Value) -> Result<i64> {
        match self.resolve_key(value) {
            Some(key) => self.inner.time(&key).await,
            None => Ok(0),
        }
    }

    pub async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }

    pub async fn grep_keys(&self, pattern: impl Into<Pattern>) -> Result<Vec<String>> {
        self.inner.grep_keys(pattern).await
    }

    /// 按键匹配删除，返回删除的条目数
    pub async fn grep_remove(&self, pattern: impl Into<Pattern>) -> Result<usize> {
        self.inner.grep_remove(pattern).await
    }

    pub async fn values(&self) -> Result<Vec<Value>> {
        self.inner.values().await
    }

    pub async fn size(&self) -> Result<usize> {
        self.inner.size().await
    }

    pub async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }
}

/// 把传入字段写入目标对象，返回是否有差异
fn apply_fields(target: &mut Map<String, Value>, fields: &Map<String, Value>) -> bool {
    let mut changed = false;
    for (field, incoming) in fields {
        if target.get(field) == Some(incoming) {
            continue;
        }
        changed = true;
        if field != PRESERVED_FIELD {
            target.insert(field.clone(), incoming.clone());
        }
    }
    changed
}
