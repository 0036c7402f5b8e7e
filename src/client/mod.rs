//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了面向调用方的缓存客户端：值缓存与对象缓存。

pub mod object;
pub mod simple;

pub use object::{default_key_generator, KeyGenerator, ObjectCache};
pub use simple::SimpleCache;

use crate::error::Result;
use futures::future::BoxFuture;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;

/// 缓存条目
///
/// 时间戳只用于调用方的冲突判断，不会触发过期
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: Value,
    /// 毫秒级时间戳
    pub timestamp: i64,
}

impl CacheEntry {
    pub fn new(data: Value, timestamp: i64) -> Self {
        Self { data, timestamp }
    }

    /// 从存储中读出的记录解析条目，结构不符时返回 None
    pub(crate) fn from_stored(value: Value) -> Option<Self> {
        serde_json::from_value(value).ok()
    }
}

/// 当前时间（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 键匹配模式
#[derive(Debug, Clone)]
pub enum Pattern {
    /// 按字面子串匹配
    Literal(String),
    Regex(Regex),
}

impl Pattern {
    /// 编译为正则表达式；字面模式会先转义
    pub fn to_regex(&self) -> Result<Regex> {
        match self {
            Pattern::Literal(s) => Ok(Regex::new(&regex::escape(s))?),
            Pattern::Regex(re) => Ok(re.clone()),
        }
    }
}

impl From<&str> for Pattern {
    fn from(s: &str) -> Self {
        Pattern::Literal(s.to_string())
    }
}

impl From<String> for Pattern {
    fn from(s: String) -> Self {
        Pattern::Literal(s)
    }
}

impl From<Regex> for Pattern {
    fn from(re: Regex) -> Self {
        Pattern::Regex(re)
    }
}

/// 未命中时调用的加载函数
pub type Getter = Box<dyn FnOnce() -> BoxFuture<'static, Result<Option<Value>>> + Send>;

/// 命中时的通知回调
pub type ReadThrough = Box<dyn FnOnce(&Value) + Send>;

/// 读取选项
///
/// 加载函数的结果不会自动写入缓存
#[derive(Default)]
pub struct Lookup {
    getter: Option<Getter>,
    read_through: Option<ReadThrough>,
}

impl Lookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置未命中时的加载函数
    pub fn getter<F, Fut>(mut self, getter: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<Value>>> + Send + 'static,
    {
        self.getter = Some(Box::new(move || Box::pin(getter())));
        self
    }

    /// 设置命中时的通知回调
    pub fn read_through<F>(mut self, handler: F) -> Self
    where
        F: FnOnce(&Value) + Send + 'static,
    {
        self.read_through = Some(Box::new(handler));
        self
    }

    /// 处理命中：通知回调后返回原值
    pub(crate) fn hit(self, value: Value) -> Option<Value> {
        if let Some(handler) = self.read_through {
            handler(&value);
        }
        Some(value)
    }

    /// 处理未命中：有加载函数时返回其结果
    pub(crate) async fn miss(self) -> Result<Option<Value>> {
        match self.getter {
            Some(getter) => getter().await,
            None => Ok(None),
        }
    }
}
