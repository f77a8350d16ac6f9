//! 键级锁表
//!
//! 每个指纹对应一把锁，按需创建。同一指纹的并发调用串行执行，不同指纹互不阻塞。
//! 获取锁有等待上限，超时的调用方直接失败，不会影响正在持有锁的调用。
//!
//! 锁条目按引用计数回收：最后一个持有/等待者离开后即从表中移除，
//! 长时间运行时锁表大小只与“正在进行的调用”相关。

use super::Fingerprint;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// 等待锁超时
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTimedOut;

/// 指纹 -> 锁
#[derive(Debug, Default)]
pub struct LockTable {
    slots: Mutex<HashMap<Fingerprint, Arc<Mutex<()>>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在指纹锁内执行 `f`
    ///
    /// 在 `timeout` 内拿不到锁时返回 `Err(LockTimedOut)`，`f` 不会被执行。
    pub fn run_locked<R>(
        &self,
        key: &Fingerprint,
        timeout: Duration,
        f: impl FnOnce() -> R,
    ) -> Result<R, LockTimedOut> {
        let slot = self.acquire_slot(key);

        let result = match slot.try_lock_for(timeout) {
            Some(_guard) => Ok(f()),
            None => Err(LockTimedOut),
        };

        self.release_slot(key, slot);
        result
    }

    fn acquire_slot(&self, key: &Fingerprint) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock();
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    fn release_slot(&self, key: &Fingerprint, slot: Arc<Mutex<()>>) {
        let mut slots = self.slots.lock();
        // 表里一份 + 当前调用一份：没有其他持有者或等待者
        if Arc::strong_count(&slot) == 2 {
            slots.remove(key);
        }
    }

    /// 当前存活的锁条目数量
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
