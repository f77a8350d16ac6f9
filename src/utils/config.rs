use crate::models::DiagConfig;
use anyhow::Context;
use std::fs;
use std::path::PathBuf;

/// 覆盖配置目录的环境变量
pub const CONFIG_DIR_ENV: &str = "VPCDIAG_CONFIG_DIR";
/// 覆盖默认缓存目录的环境变量
pub const CACHE_DIR_ENV: &str = "VPCDIAG_CACHE_DIR";

/// 配置目录（默认 `~/.vpcdiag`），若不存在则创建
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let config_dir = match std::env::var_os(CONFIG_DIR_ENV) {
        Some(dir) => PathBuf::from(dir),
        None => dirs::home_dir()
            .context("无法获取用户主目录")?
            .join(".vpcdiag"),
    };

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)
            .with_context(|| format!("创建配置目录失败: {}", config_dir.display()))?;
    }
    Ok(config_dir)
}

/// 配置文件路径
pub fn config_path() -> anyhow::Result<PathBuf> {
    Ok(config_dir()?.join("config.json"))
}

/// 读取配置（文件不存在时返回默认配置）
pub fn read_config() -> anyhow::Result<DiagConfig> {
    let config_path = config_path()?;
    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "配置文件不存在，使用默认配置");
        return Ok(DiagConfig::default());
    }

    let content = fs::read_to_string(&config_path)
        .with_context(|| format!("读取配置失败: {}", config_path.display()))?;
    let config: DiagConfig = serde_json::from_str(&content)
        .with_context(|| format!("解析配置失败: {}", config_path.display()))?;
    Ok(config)
}

/// 默认缓存目录
///
/// 优先使用 `VPCDIAG_CACHE_DIR`，否则为系统缓存目录下的 `vpcdiag`，
/// 都不可用时退回临时目录。
pub fn default_cache_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(CACHE_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("vpcdiag")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    struct EnvGuard(&'static str);

    impl EnvGuard {
        fn set(key: &'static str, value: &std::path::Path) -> Self {
            std::env::set_var(key, value);
            Self(key)
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            std::env::remove_var(self.0);
        }
    }

    #[test]
    #[serial]
    fn test_missing_config_returns_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let _guard = EnvGuard::set(CONFIG_DIR_ENV, temp_dir.path());

        let config = read_config().unwrap();
        assert_eq!(config, DiagConfig::default());
    }

    #[test]
    #[serial]
    fn test_read_config_from_override_dir() {
        let temp_dir = TempDir::new().unwrap();
        let _guard = EnvGuard::set(CONFIG_DIR_ENV, temp_dir.path());
        fs::write(
            temp_dir.path().join("config.json"),
            r#"{"cache": {"cache_dir": "/var/tmp/vpcdiag", "lock_timeout_secs": 30}, "log": {"level": "debug"}}"#,
        )
        .unwrap();

        let config = read_config().unwrap();
        assert_eq!(config.cache.cache_dir, PathBuf::from("/var/tmp/vpcdiag"));
        assert_eq!(config.cache.lock_timeout_secs, 30);
        assert_eq!(config.log.level, crate::models::LogLevel::Debug);
    }

    #[test]
    #[serial]
    fn test_invalid_config_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let _guard = EnvGuard::set(CONFIG_DIR_ENV, temp_dir.path());
        fs::write(temp_dir.path().join("config.json"), "{not json").unwrap();

        let err = read_config().unwrap_err();
        assert!(err.to_string().contains("解析配置失败"));
    }

    #[test]
    #[serial]
    fn test_cache_dir_override() {
        let temp_dir = TempDir::new().unwrap();
        let _guard = EnvGuard::set(CACHE_DIR_ENV, temp_dir.path());
        assert_eq!(default_cache_dir(), temp_dir.path());
    }
}
