//! 持久化缓存存储
//!
//! 基于 SQLite 的键值存储，支持：
//! - 绝对过期时间（毫秒级 Unix 时间戳）
//! - 生命周期标签：`session`（仅本次运行有效）与 `durable`（跨运行保留）
//! - 打开失败时有限次重试，并在重试之间尝试修复目录权限
//!
//! # 使用示例
//!
//! ```rust
//! use std::path::Path;
//! use std::time::Duration;
//! use crate::data::cache::{CacheStore, EntryTag};
//!
//! let store = CacheStore::open(Path::new("/tmp/vpcdiag-cache"))?;
//! store.set("network::get_network:ab12", b"{}", Some(Duration::from_secs(3600)))?;
//! assert!(store.get("network::get_network:ab12")?.is_some());
//!
//! // 清理本次运行的临时数据
//! store.evict_tag(EntryTag::Session)?;
//! ```

use crate::data::{CacheError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// 缓存数据库文件名
pub const STORE_FILE_NAME: &str = "cache.db";

/// 打开存储时的最大尝试次数
pub const MAX_OPEN_ATTEMPTS: u32 = 5;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    tag TEXT NOT NULL,
    expires_at INTEGER,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cache_entries_tag ON cache_entries(tag);
CREATE INDEX IF NOT EXISTS idx_cache_entries_expires ON cache_entries(expires_at);
";

/// 缓存条目的生命周期标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryTag {
    /// 仅在本次运行内有效，进程启动和退出时都会被清理
    Session,
    /// 带过期时间，跨运行保留直到过期
    Durable,
}

impl EntryTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryTag::Session => "session",
            EntryTag::Durable => "durable",
        }
    }
}

/// SQLite 缓存存储
///
/// 单连接 + `Mutex`，与进程生命周期一致，由 `ApiCache` 持有。
pub struct CacheStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl CacheStore {
    /// 在指定目录下打开（或创建）缓存存储
    ///
    /// 失败时会尝试修复目录权限后重试，最多 [`MAX_OPEN_ATTEMPTS`] 次，
    /// 全部失败返回 `CacheError::StoreUnavailable`。
    pub fn open(dir: &Path) -> Result<Self> {
        let db_path = dir.join(STORE_FILE_NAME);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match Self::open_once(dir, &db_path) {
                Ok(store) => {
                    tracing::debug!(path = %db_path.display(), attempt, "缓存存储已打开");
                    return Ok(store);
                }
                Err(e) if attempt >= MAX_OPEN_ATTEMPTS => {
                    tracing::error!(
                        path = %db_path.display(),
                        attempts = attempt,
                        error = %e,
                        "打开缓存存储失败，放弃重试"
                    );
                    return Err(CacheError::StoreUnavailable {
                        path: db_path,
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        path = %db_path.display(),
                        attempt,
                        error = %e,
                        "打开缓存存储失败，尝试修复权限后重试"
                    );
                    repair_permissions(dir);
                }
            }
        }
    }

    fn open_once(dir: &Path, db_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| CacheError::io(dir, e))?;

        let conn = Connection::open(db_path)?;
        // 多个进程共享同一缓存目录时，等待写锁而不是立刻失败
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: db_path.to_path_buf(),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CacheError::Concurrency(e.to_string()))?;
        f(&conn)
    }

    /// 读取缓存值
    ///
    /// # 返回
    ///
    /// - `Some(Vec<u8>)`: 命中且未过期（值本身可以是序列化后的 `null`）
    /// - `None`: 未命中或已过期
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = now_millis();
        self.with_conn(|conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM cache_entries
                     WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                    params![key, now],
                    |row| row.get::<_, Vec<u8>>(0),
                )
                .optional()?;
            Ok(value)
        })
    }

    /// 写入缓存值
    ///
    /// `expire` 为 `None` 时写入 `session` 标签，否则写入 `durable` 标签并记录绝对过期时间。
    pub fn set(&self, key: &str, value: &[u8], expire: Option<Duration>) -> Result<()> {
        let now = now_millis();
        let (tag, expires_at) = match expire {
            Some(ttl) => {
                let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
                (EntryTag::Durable, Some(now.saturating_add(ttl_ms)))
            }
            None => (EntryTag::Session, None),
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO cache_entries (key, value, tag, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![key, value, tag.as_str(), expires_at, now],
            )?;
            Ok(())
        })
    }

    /// 删除指定标签的所有条目，返回删除数量
    pub fn evict_tag(&self, tag: EntryTag) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM cache_entries WHERE tag = ?1",
                params![tag.as_str()],
            )?;
            Ok(removed)
        })
    }

    /// 删除所有已过期的条目，返回删除数量
    pub fn expire(&self) -> Result<usize> {
        let now = now_millis();
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now],
            )?;
            Ok(removed)
        })
    }

    /// 清理 `session` 条目和过期条目（进程启动与退出时调用）
    pub fn purge_session(&self) -> Result<usize> {
        let removed = self.evict_tag(EntryTag::Session)? + self.expire()?;
        if removed > 0 {
            tracing::debug!(removed, "已清理会话缓存与过期缓存");
        }
        Ok(removed)
    }

    /// 当前条目数量（包含尚未清理的过期条目）
    pub fn len(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// 数据库文件路径
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 尽力修复缓存目录权限（仅 Unix）
///
/// 目录或数据库文件被其他用户/旧版本以只读权限创建时，打开会失败。
#[cfg(unix)]
fn repair_permissions(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;

    fn visit(path: &Path) {
        let Ok(metadata) = std::fs::metadata(path) else {
            return;
        };
        let mode = if metadata.is_dir() { 0o700 } else { 0o600 };
        let mut perms = metadata.permissions();
        perms.set_mode(mode);
        if let Err(e) = std::fs::set_permissions(path, perms) {
            tracing::debug!(path = %path.display(), error = %e, "修复权限失败");
        }
        if metadata.is_dir() {
            if let Ok(entries) = std::fs::read_dir(path) {
                for entry in entries.flatten() {
                    visit(&entry.path());
                }
            }
        }
    }

    visit(dir);
}

#[cfg(not(unix))]
fn repair_permissions(_dir: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, CacheStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::open(temp_dir.path()).unwrap();
        (temp_dir, store)
    }

    #[test]
    fn test_open_creates_db_file() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested").join("cache");
        let store = CacheStore::open(&nested).unwrap();
        assert!(store.db_path().exists());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_set_and_get() {
        let (_temp_dir, store) = create_test_store();
        store.set("k1", b"[1,2,3]", None).unwrap();
        assert_eq!(store.get("k1").unwrap(), Some(b"[1,2,3]".to_vec()));
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn test_null_value_is_present() {
        let (_temp_dir, store) = create_test_store();
        store.set("none-result", b"null", None).unwrap();
        assert_eq!(store.get("none-result").unwrap(), Some(b"null".to_vec()));
    }

    #[test]
    fn test_overwrite_existing_key() {
        let (_temp_dir, store) = create_test_store();
        store.set("k", b"1", None).unwrap();
        store.set("k", b"2", Some(Duration::from_secs(60))).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let (_temp_dir, store) = create_test_store();
        store
            .set("short", b"1", Some(Duration::from_millis(50)))
            .unwrap();
        assert!(store.get("short").unwrap().is_some());

        thread::sleep(Duration::from_millis(120));

        assert!(store.get("short").unwrap().is_none());
        // 过期条目在清理前仍占一行
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.expire().unwrap(), 1);
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn test_evict_session_keeps_durable() {
        let (_temp_dir, store) = create_test_store();
        store.set("session-1", b"1", None).unwrap();
        store.set("session-2", b"2", None).unwrap();
        store
            .set("durable", b"3", Some(Duration::from_secs(3600)))
            .unwrap();

        assert_eq!(store.evict_tag(EntryTag::Session).unwrap(), 2);
        assert!(store.get("session-1").unwrap().is_none());
        assert!(store.get("durable").unwrap().is_some());
    }

    #[test]
    fn test_purge_session_combines_both() {
        let (_temp_dir, store) = create_test_store();
        store.set("session", b"1", None).unwrap();
        store
            .set("expired", b"2", Some(Duration::from_millis(10)))
            .unwrap();
        store
            .set("durable", b"3", Some(Duration::from_secs(3600)))
            .unwrap();

        thread::sleep(Duration::from_millis(50));

        assert_eq!(store.purge_session().unwrap(), 2);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_entries_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = CacheStore::open(temp_dir.path()).unwrap();
            store
                .set("durable", b"3", Some(Duration::from_secs(3600)))
                .unwrap();
        }
        let store = CacheStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.get("durable").unwrap(), Some(b"3".to_vec()));
    }

    #[test]
    fn test_open_fails_after_retries() {
        let temp_dir = TempDir::new().unwrap();
        // 用普通文件占住目录位置，create_dir_all 必然失败
        let blocker = temp_dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let err = CacheStore::open(&blocker).err().unwrap();
        match err {
            CacheError::StoreUnavailable { attempts, .. } => {
                assert_eq!(attempts, MAX_OPEN_ATTEMPTS)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_tag_names() {
        assert_eq!(EntryTag::Session.as_str(), "session");
        assert_eq!(EntryTag::Durable.as_str(), "durable");
    }
}
