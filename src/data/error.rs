//! 统一错误类型定义
//!
//! 使用 `thiserror` 定义缓存层的错误类型：
//! - `CacheError`: 存储/指纹相关错误，只有 `ApiCache::open` 会把它暴露给调用方
//! - `CallError<E>`: 被包装函数的调用错误（锁超时或上游错误）

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// 缓存存储层的统一错误类型
#[derive(Error, Debug)]
pub enum CacheError {
    /// 文件 I/O 错误
    #[error("文件 I/O 错误: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 数据库错误
    #[error("数据库错误: {0}")]
    Database(#[from] rusqlite::Error),

    /// 缓存值序列化/反序列化错误
    #[error("缓存值序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 参数编码失败，无法计算指纹
    #[error("无法计算调用指纹: {0}")]
    Fingerprint(#[from] bincode::Error),

    /// 多次重试后仍无法打开缓存存储
    #[error("缓存存储不可用: {path}（已尝试 {attempts} 次）: {source}")]
    StoreUnavailable {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: Box<CacheError>,
    },

    /// 并发错误
    #[error("并发错误: {0}")]
    Concurrency(String),
}

/// 便于与现有代码集成的类型别名
pub type Result<T> = std::result::Result<T, CacheError>;

/// 便捷的 I/O 错误构造器
impl CacheError {
    /// 从 `std::io::Error` 和路径创建 I/O 错误
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// 被包装函数的调用错误
///
/// 存储错误不会出现在这里：它们被记录日志后降级为“本次不缓存”。
#[derive(Error, Debug)]
pub enum CallError<E> {
    /// 在限定时间内没有拿到该指纹的锁
    #[error("获取 {function} 的缓存锁超时（等待 {timeout:?}）")]
    LockTimeout { function: String, timeout: Duration },

    /// 被包装函数自身返回的错误，原样透传且不会被缓存
    #[error("{0}")]
    Upstream(E),
}

impl<E> CallError<E> {
    /// 是否为锁等待超时
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }

    /// 取出上游错误（锁超时返回 `None`）
    pub fn into_upstream(self) -> Option<E> {
        match self {
            Self::Upstream(e) => Some(e),
            Self::LockTimeout { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_construction() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = CacheError::io("/path/to/cache", io_err);
        assert!(err.to_string().contains("/path/to/cache"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid json").unwrap_err();
        let err: CacheError = json_err.into();
        assert!(matches!(err, CacheError::Serialization(_)));
    }

    #[test]
    fn test_store_unavailable_mentions_attempts() {
        let inner = CacheError::Concurrency("locked".to_string());
        let err = CacheError::StoreUnavailable {
            path: PathBuf::from("/tmp/cache.db"),
            attempts: 5,
            source: Box::new(inner),
        };
        let msg = err.to_string();
        assert!(msg.contains("5"));
        assert!(msg.contains("/tmp/cache.db"));
    }

    #[test]
    fn test_lock_timeout_names_function() {
        let err: CallError<std::io::Error> = CallError::LockTimeout {
            function: "get_network".to_string(),
            timeout: Duration::from_secs(120),
        };
        assert!(err.is_lock_timeout());
        assert!(err.to_string().contains("get_network"));
        assert!(err.into_upstream().is_none());
    }

    #[test]
    fn test_upstream_error_passthrough() {
        let err: CallError<String> = CallError::Upstream("quota exceeded".to_string());
        assert!(!err.is_lock_timeout());
        assert_eq!(err.to_string(), "quota exceeded");
        assert_eq!(err.into_upstream().as_deref(), Some("quota exceeded"));
    }

    #[test]
    fn test_anyhow_conversion() {
        let err: CallError<anyhow::Error> = CallError::Upstream(anyhow::anyhow!("boom"));
        let anyhow_err: anyhow::Error = err.into();
        assert!(anyhow_err.to_string().contains("boom"));
    }
}
