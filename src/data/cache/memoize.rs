//! 记忆化调用包装
//!
//! `CachedCall` 把一个开销大、幂等的函数包装成“看起来被记忆化”的调用：
//! - 同一指纹的并发调用只触发一次上游调用，其余调用方等待并读取缓存结果
//! - 可选进程内缓存层，作为持久化存储不可用时的缓解手段
//! - 存储读写失败只记日志，不影响调用方
//! - 上游错误原样返回，且不会被缓存
//!
//! 通过 [`ApiCache::wrap`](crate::data::ApiCache::wrap) 创建。

use super::{Fingerprint, MemoryTier};
use crate::data::{ApiCache, CallError};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// 进程内缓存层每个包装最多保留的结果数
pub const MEMORY_TIER_CAPACITY: usize = 128;

/// 包装选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// 过期时间；`None` 表示只在本次运行内有效
    pub expire: Option<Duration>,
    /// 是否额外保留进程内缓存（最近使用的 [`MEMORY_TIER_CAPACITY`] 个结果）
    pub in_memory: bool,
}

impl CacheOptions {
    /// 仅本次运行有效（默认）
    pub fn session() -> Self {
        Self::default()
    }

    /// 设置过期时间，结果跨运行保留直到过期
    pub fn expire(mut self, ttl: Duration) -> Self {
        self.expire = Some(ttl);
        self
    }

    /// 启用进程内缓存
    pub fn in_memory(mut self) -> Self {
        self.in_memory = true;
        self
    }
}

/// 记忆化后的函数
///
/// 调用签名与原函数一致（参数按引用传入），额外可能返回 `CallError::LockTimeout`。
/// 返回值是缓存内容的独立副本，调用方修改它不会影响后续命中。
pub struct CachedCall<A: ?Sized, T, E> {
    name: String,
    options: CacheOptions,
    cache: Arc<ApiCache>,
    memory: Option<Mutex<MemoryTier<Fingerprint, T>>>,
    func: Box<dyn Fn(&A) -> Result<T, E> + Send + Sync>,
    _args: PhantomData<fn(&A)>,
}

impl<A, T, E> CachedCall<A, T, E>
where
    A: Serialize + ?Sized,
    T: Serialize + DeserializeOwned + Clone,
{
    pub(crate) fn new<F>(cache: Arc<ApiCache>, name: String, options: CacheOptions, func: F) -> Self
    where
        F: Fn(&A) -> Result<T, E> + Send + Sync + 'static,
    {
        Self {
            name,
            options,
            cache,
            memory: options
                .in_memory
                .then(|| Mutex::new(MemoryTier::with_capacity(MEMORY_TIER_CAPACITY))),
            func: Box::new(func),
            _args: PhantomData,
        }
    }

    /// 调用点名称
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> CacheOptions {
        self.options
    }

    /// 执行调用
    ///
    /// 命中缓存时不会调用原函数；未命中时在指纹锁内调用一次并写入缓存。
    pub fn call(&self, args: &A) -> Result<T, CallError<E>> {
        let key = match Fingerprint::new(&self.name, args) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(function = %self.name, error = %e, "无法计算调用指纹，跳过缓存");
                return (self.func)(args).map_err(CallError::Upstream);
            }
        };

        // 锁表归 ApiCache 所有，同名包装之间共享
        let timeout = self.cache.lock_timeout();
        self.cache
            .locks()
            .run_locked(&key, timeout, || self.call_locked(&key, args))
            .map_err(|_| {
                tracing::warn!(function = %self.name, ?timeout, "等待缓存锁超时");
                CallError::LockTimeout {
                    function: self.name.clone(),
                    timeout,
                }
            })?
    }

    fn call_locked(&self, key: &Fingerprint, args: &A) -> Result<T, CallError<E>> {
        if let Some(memory) = &self.memory {
            if let Some(value) = memory.lock().get(key) {
                tracing::debug!(function = %self.name, "返回进程内缓存结果");
                return Ok(value.clone());
            }
        }

        if let Some(value) = self.read_durable(key) {
            tracing::debug!(function = %self.name, "返回持久化缓存结果");
            self.remember(key, &value);
            return Ok(value);
        }

        tracing::debug!(
            function = %self.name,
            expire = ?self.options.expire,
            key = %key,
            "调用上游函数"
        );
        let value = (self.func)(args).map_err(CallError::Upstream)?;

        self.write_durable(key, &value);
        self.remember(key, &value);
        Ok(value)
    }

    fn remember(&self, key: &Fingerprint, value: &T) {
        if let Some(memory) = &self.memory {
            memory
                .lock()
                .insert(key.clone(), value.clone(), self.options.expire);
        }
    }

    /// 读取持久化缓存；任何失败都按未命中处理
    fn read_durable(&self, key: &Fingerprint) -> Option<T> {
        let store = self.cache.store()?;
        let bytes = match store.get(&key.storage_key()) {
            Ok(bytes) => bytes?,
            Err(e) => {
                tracing::warn!(function = %self.name, error = %e, "读取缓存失败，按未命中处理");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(function = %self.name, error = %e, "缓存内容无法解析，按未命中处理");
                None
            }
        }
    }

    /// 写入持久化缓存；失败只记录日志
    fn write_durable(&self, key: &Fingerprint, value: &T) {
        let Some(store) = self.cache.store() else {
            return;
        };

        let result = serde_json::to_vec(value)
            .map_err(crate::data::CacheError::from)
            .and_then(|bytes| store.set(&key.storage_key(), &bytes, self.options.expire));

        if let Err(e) = result {
            tracing::warn!(function = %self.name, error = %e, "写入缓存失败，本次结果不缓存");
        }
    }
}
