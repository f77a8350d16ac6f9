//! 进程级缓存入口
//!
//! `ApiCache` 拥有进程内唯一的持久化存储句柄和指纹锁表，负责：
//! - 打开存储并在首次使用前清理上次运行遗留的 `session` 条目与过期条目
//! - 为上游数据获取函数创建记忆化包装（[`ApiCache::wrap`]）
//! - 分配会话级临时目录，并在关闭时统一删除
//! - 关闭时再次清理 `session` 条目并释放存储句柄（`Drop` 时自动执行）
//!
//! `ApiCache` 由顶层上下文创建后以 `Arc` 传给各个调用方，不使用全局单例。
//!
//! # 使用示例
//!
//! ```rust
//! use std::time::Duration;
//! use crate::data::{ApiCache, CacheOptions};
//! use crate::models::CacheSettings;
//!
//! let cache = ApiCache::open(CacheSettings::default())?;
//! let get_network = cache.wrap(
//!     "network::get_network",
//!     CacheOptions::session().in_memory(),
//!     |(project, name): &(String, String)| fetch_network(project, name),
//! );
//! let network = get_network.call(&("my-project".into(), "default".into()))?;
//! cache.close();
//! ```

use crate::data::cache::{CacheOptions, CacheStore, CachedCall, LockTable};
use crate::data::{CacheError, Result};
use crate::models::CacheSettings;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// 进程级记忆化缓存
pub struct ApiCache {
    settings: CacheSettings,
    /// 持久化存储（`None` 表示未启用或已关闭）
    store: RwLock<Option<Arc<CacheStore>>>,
    /// 指纹锁，所有包装共享
    locks: LockTable,
    /// 本次运行分配的临时目录
    scratch_dirs: Mutex<Vec<PathBuf>>,
}

impl ApiCache {
    /// 打开缓存
    ///
    /// 存储打开失败会重试（见 [`CacheStore::open`]），最终失败时返回错误。
    /// 打开后立即清理 `session` 条目和过期条目，避免读到上次异常退出遗留的数据。
    pub fn open(settings: CacheSettings) -> Result<Arc<Self>> {
        let store = CacheStore::open(&settings.cache_dir)?;

        if let Err(e) = store.purge_session() {
            tracing::warn!(error = %e, "清理遗留会话缓存失败");
        }

        tracing::info!(
            cache_dir = %settings.cache_dir.display(),
            lock_timeout_secs = settings.lock_timeout_secs,
            "缓存已打开"
        );

        Ok(Arc::new(Self {
            settings,
            store: RwLock::new(Some(Arc::new(store))),
            locks: LockTable::new(),
            scratch_dirs: Mutex::new(Vec::new()),
        }))
    }

    /// 创建不带持久化存储的缓存
    ///
    /// 所有持久化读写都按未命中处理；`in_memory` 包装仍然有效。
    pub fn ephemeral(settings: CacheSettings) -> Arc<Self> {
        Arc::new(Self {
            settings,
            store: RwLock::new(None),
            locks: LockTable::new(),
            scratch_dirs: Mutex::new(Vec::new()),
        })
    }

    /// 包装一个上游数据获取函数
    ///
    /// # 参数
    ///
    /// - `name`: 调用点名称，参与指纹计算并出现在日志和锁超时错误中
    /// - `options`: 过期时间与进程内缓存选项
    /// - `func`: 原函数，多个参数请用元组
    pub fn wrap<A, T, E, F>(
        self: &Arc<Self>,
        name: impl Into<String>,
        options: CacheOptions,
        func: F,
    ) -> CachedCall<A, T, E>
    where
        A: Serialize + ?Sized,
        T: Serialize + DeserializeOwned + Clone,
        F: Fn(&A) -> std::result::Result<T, E> + Send + Sync + 'static,
    {
        CachedCall::new(Arc::clone(self), name.into(), options, func)
    }

    /// 当前存储句柄（已关闭或未启用时为 `None`）
    pub fn store(&self) -> Option<Arc<CacheStore>> {
        self.store.read().clone()
    }

    /// 等待键级锁的上限
    pub fn lock_timeout(&self) -> Duration {
        self.settings.lock_timeout()
    }

    pub(crate) fn locks(&self) -> &LockTable {
        &self.locks
    }

    /// 当前存活的锁条目数量
    pub fn pending_locks(&self) -> usize {
        self.locks.len()
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn is_open(&self) -> bool {
        self.store.read().is_some()
    }

    /// 分配一个会话级临时目录
    ///
    /// 目录位于缓存目录下，`close()` 时无论成功与否都会被删除。
    pub fn scratch_dir(&self, prefix: &str) -> Result<PathBuf> {
        let base = &self.settings.cache_dir;
        std::fs::create_dir_all(base).map_err(|e| CacheError::io(base, e))?;

        #[allow(deprecated)]
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(base)
            .map_err(|e| CacheError::io(base, e))?
            .into_path();

        tracing::debug!(path = %dir.display(), "分配临时目录");
        self.scratch_dirs.lock().push(dir.clone());
        Ok(dir)
    }

    /// 关闭缓存
    ///
    /// 清理 `session` 条目和过期条目、释放存储句柄、删除所有临时目录。
    /// 可重复调用；关闭后的包装调用退化为不缓存。
    pub fn close(&self) {
        if let Some(store) = self.store.write().take() {
            if let Err(e) = store.purge_session() {
                tracing::warn!(error = %e, "关闭时清理会话缓存失败");
            }
            tracing::debug!(path = %store.db_path().display(), "缓存存储已释放");
        }

        for dir in self.scratch_dirs.lock().drain(..) {
            remove_scratch_dir(&dir);
        }
    }
}

impl Drop for ApiCache {
    fn drop(&mut self) {
        self.close();
    }
}

fn remove_scratch_dir(dir: &Path) {
    tracing::debug!(path = %dir.display(), "删除临时目录");
    if let Err(e) = std::fs::remove_dir_all(dir) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %dir.display(), error = %e, "删除临时目录失败");
        }
    }
}
