//! 缓存层实现
//!
//! 记忆化缓存由以下部分组成：
//! - `fingerprint`: 调用指纹（调用点 + 参数摘要）
//! - `locks`: 键级锁表（带超时，按引用计数回收，由 `ApiCache` 持有）
//! - `memory`: 进程内缓存层（LRU 容量上限，逐条目过期）
//! - `store`: SQLite 持久化存储（`session` / `durable` 生命周期标签）
//! - `memoize`: 记忆化调用包装 `CachedCall`

pub mod fingerprint;
pub mod locks;
pub mod memoize;
pub mod memory;
pub mod store;

pub use fingerprint::Fingerprint;
pub use locks::{LockTable, LockTimedOut};
pub use memoize::{CacheOptions, CachedCall, MEMORY_TIER_CAPACITY};
pub use memory::MemoryTier;
pub use store::{CacheStore, EntryTag, MAX_OPEN_ATTEMPTS};
