//! 进程内缓存层
//!
//! 在持久化存储之前的最快路径，支持：
//! - 逐条目过期：每个条目可携带自己的过期时间，`None` 表示随进程存活
//! - 容量上限：超过容量淘汰最久未使用的项
//!
//! 本结构自身不加锁，由调用方包一层 `Mutex`。
//!
//! # 使用示例
//!
//! ```rust
//! use std::time::Duration;
//! use crate::data::cache::MemoryTier;
//!
//! let mut tier = MemoryTier::with_capacity(128);
//! tier.insert("key", "value", Some(Duration::from_secs(300)));
//! assert_eq!(tier.get(&"key"), Some(&"value"));
//! ```

use linked_hash_map::LinkedHashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// 缓存条目，包含值和过期时刻
#[derive(Debug, Clone)]
struct MemoryEntry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> MemoryEntry<V> {
    fn new(value: V, expire: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: expire.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// 进程内缓存
///
/// 使用 `LinkedHashMap` 记录访问顺序，超过容量按 LRU 淘汰。
#[derive(Debug)]
pub struct MemoryTier<K: Eq + Hash, V> {
    entries: LinkedHashMap<K, MemoryEntry<V>>,
    capacity: usize,
}

impl<K: Eq + Hash, V> MemoryTier<K, V> {
    /// 创建缓存，容量至少为 1
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: LinkedHashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// 获取缓存值
    ///
    /// 键存在且未过期时返回 `Some(&V)` 并刷新 LRU 位置；已过期的条目顺手删除。
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let expired = self.entries.get(key)?.is_expired(Instant::now());
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get_refresh(key).map(|entry| &entry.value)
    }

    /// 插入缓存值
    ///
    /// 已存在的键会被覆盖并重新计时；超过容量时淘汰最久未使用的项。
    pub fn insert(&mut self, key: K, value: V, expire: Option<Duration>) {
        self.entries.remove(&key);

        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }

        self.entries.insert(key, MemoryEntry::new(value, expire));
    }

    /// 当前条目数量（包含尚未清理的过期条目）
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
