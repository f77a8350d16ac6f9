//! 统一数据获取缓存模块
//!
//! 所有上游数据获取函数都通过这里的记忆化缓存调用，避免重复的昂贵请求，
//! 并把同一请求的并发调用合并为一次。
//!
//! # 模块组织
//!
//! - `error`: 统一错误类型定义
//! - `cache`: 缓存层实现（指纹 + 键级锁 + 进程内缓存 + SQLite 存储）
//! - `manager`: 进程级入口 `ApiCache`
//!
//! # 使用示例
//!
//! ```rust
//! use crate::data::{ApiCache, CacheOptions};
//! use crate::models::CacheSettings;
//!
//! let cache = ApiCache::open(CacheSettings::default())?;
//! let get_project = cache.wrap("crm::get_project", CacheOptions::session(), fetch_project);
//! let project = get_project.call("my-project")?;
//! ```

pub mod cache;
pub mod error;
pub mod manager;

pub use cache::{CacheOptions, CachedCall, Fingerprint};
pub use error::{CacheError, CallError, Result};
pub use manager::ApiCache;
