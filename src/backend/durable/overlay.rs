//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 持久化实例的进程内覆盖层：已知值、墓碑以及待写入队列。
//!
//! 读取优先级固定为 墓碑 > 覆盖层 > 持久化存储，只由 [`Overlay::read`] 决定。

use std::collections::{HashMap, HashSet};

/// 覆盖层对一次读取的判定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayRead {
    /// 键已删除（或所在命名空间已清空），不能再读持久化存储
    Removed,
    /// 覆盖层里有序列化后的值
    Cached(Vec<u8>),
    /// 覆盖层不知道这个键，需要读持久化存储
    Unknown,
}

#[derive(Debug, Default)]
pub struct Overlay {
    entries: HashMap<String, Vec<u8>>,
    tombstones: HashSet<String>,
    pending: HashMap<String, Vec<u8>>,
    /// 命名空间清空后、持久化删除确认前，屏蔽所有未知键
    masked: bool,
    /// 写入、删除、清空的累计次数
    changes: u64,
}

impl Overlay {
    pub fn read(&self, key: &str) -> OverlayRead {
        if self.tombstones.contains(key) {
            return OverlayRead::Removed;
        }
        if let Some(bytes) = self.entries.get(key) {
            return OverlayRead::Cached(bytes.clone());
        }
        if self.masked {
            return OverlayRead::Removed;
        }
        OverlayRead::Unknown
    }

    /// 记录一次写入；`persist` 为 false 时只在本次会话内可见
    pub fn write(&mut self, key: &str, bytes: Vec<u8>, persist: bool) {
        self.changes += 1;
        self.tombstones.remove(key);
        if persist {
            self.pending.insert(key.to_string(), bytes.clone());
        } else {
            self.pending.remove(key);
        }
        self.entries.insert(key.to_string(), bytes);
    }

    /// 变更计数，读取持久化存储前记录，回填时比对
    pub fn changes(&self) -> u64 {
        self.changes
    }

    /// 用持久化读取的结果填充覆盖层
    ///
    /// 等待存储期间键可能已被改写或删除，此时以覆盖层为准，返回当前判定。
    /// `seen` 之后覆盖层有过变更时只返回读到的值，不写入覆盖层：
    /// 删除确认后墓碑已解除，旧数据不能再被缓存下来
    pub fn fill(&mut self, key: &str, bytes: Vec<u8>, seen: u64) -> OverlayRead {
        match self.read(key) {
            OverlayRead::Unknown => {
                if self.changes == seen {
                    self.entries.insert(key.to_string(), bytes.clone());
                }
                OverlayRead::Cached(bytes)
            }
            other => other,
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.changes += 1;
        self.entries.remove(key);
        self.pending.remove(key);
        self.tombstones.insert(key.to_string());
    }

    /// 持久化删除已确认，解除墓碑
    pub fn confirm_removed(&mut self, key: &str) {
        self.tombstones.remove(key);
    }

    /// 清空覆盖层并为所有已知键设置墓碑，返回被标记的键
    pub fn clear(&mut self) -> Vec<String> {
        let mut marked: Vec<String> = self
            .entries
            .keys()
            .chain(self.pending.keys())
            .cloned()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        marked.sort();
        self.changes += 1;

        for key in &marked {
            self.tombstones.insert(key.clone());
        }
        self.entries.clear();
        self.pending.clear();
        self.masked = true;
        marked
    }

    /// 命名空间的持久化清空已确认
    pub fn confirm_cleared(&mut self, marked: &[String]) {
        for key in marked {
            self.tombstones.remove(key);
        }
        self.masked = false;
    }

    pub fn is_masked(&self) -> bool {
        self.masked
    }

    pub fn is_tombstoned(&self, key: &str) -> bool {
        self.tombstones.contains(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// 取出整个待写入队列
    pub fn take_pending(&mut self) -> Vec<(String, Vec<u8>)> {
        let mut batch: Vec<(String, Vec<u8>)> = self.pending.drain().collect();
        batch.sort_by(|a, b| a.0.cmp(&b.0));
        batch
    }

    /// 刷新失败后把仍然有效的条目放回队列
    ///
    /// 期间被重新写入或删除的键不再放回
    pub fn requeue(&mut self, batch: Vec<(String, Vec<u8>)>) -> usize {
        let mut restored = 0;
        for (key, bytes) in batch {
            if self.tombstones.contains(&key) || self.pending.contains_key(&key) {
                continue;
            }
            if self.entries.get(&key) != Some(&bytes) {
                continue;
            }
            self.pending.insert(key, bytes);
            restored += 1;
        }
        restored
    }
}
