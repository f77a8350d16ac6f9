use crate::models::config::{LogConfig, LogFormat, LogLevel, LogOutput};
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    fmt,
    layer::{Layered, SubscriberExt},
    reload::{self, Handle},
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// 日志文件名前缀
const LOG_FILE_PREFIX: &str = "vpcdiag";

/// 全局日志级别 reload handle
static LOG_LEVEL_HANDLE: OnceLock<Handle<EnvFilter, Registry>> = OnceLock::new();

/// 文件输出的后台写线程 guard，进程存活期间保持
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// 过滤层之上的订阅者类型
type FilteredRegistry = Layered<reload::Layer<EnvFilter, Registry>, Registry>;
type BoxedLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync + 'static>;

/// 初始化日志系统
///
/// 支持：
/// - 日志级别（trace/debug/info/warn/error），`RUST_LOG` 优先
/// - 输出格式（JSON/纯文本）
/// - 输出目标（控制台/文件/both），文件按天滚动
///
/// 日志级别可以通过 [`update_log_level`] 动态调整，其他配置需要重新启动后生效。
/// 重复初始化返回错误。
pub fn init_logger(config: &LogConfig) -> anyhow::Result<()> {
    let filter = create_env_filter(config.level);
    let (filter_layer, reload_handle) = reload::Layer::new(filter);

    if LOG_LEVEL_HANDLE.set(reload_handle).is_err() {
        anyhow::bail!("日志系统已初始化，不能重复初始化");
    }

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if matches!(config.output, LogOutput::Console | LogOutput::Both) {
        layers.push(create_console_layer(config.format));
    }
    if matches!(config.output, LogOutput::File | LogOutput::Both) {
        layers.push(create_file_layer(config.format, config.file_path.as_deref())?);
    }

    Registry::default()
        .with(filter_layer)
        .with(layers)
        .try_init()
        .map_err(|e| anyhow::anyhow!("注册全局日志订阅者失败: {}", e))?;

    tracing::info!(
        level = config.level.as_str(),
        format = ?config.format,
        output = ?config.output,
        file_path = ?config.file_path,
        "日志系统初始化完成"
    );

    Ok(())
}

/// 创建环境过滤器
fn create_env_filter(level: LogLevel) -> EnvFilter {
    // 格式：RUST_LOG=debug 或 RUST_LOG=vpcdiag=trace,vpcdiag::anomaly=warn
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

/// 默认过滤规则：本 crate 使用指定级别，依赖库只输出警告
fn default_directives(level: LogLevel) -> String {
    format!("vpcdiag={},rusqlite=warn", level.as_str())
}

fn create_console_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Text => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(cfg!(debug_assertions))
            .with_thread_ids(false)
            .with_ansi(true)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .boxed(),
    }
}

fn create_file_layer(format: LogFormat, file_path: Option<&str>) -> anyhow::Result<BoxedLayer> {
    let log_dir = get_log_dir(file_path)?;
    let file_appender = rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = non_blocking(file_appender);

    if FILE_GUARD.set(guard).is_err() {
        anyhow::bail!("日志文件输出已初始化");
    }

    Ok(match format {
        LogFormat::Text => fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(false)
            .boxed(),
    })
}

/// 获取日志目录（缺省为 `<配置目录>/logs`），不存在时创建
fn get_log_dir(file_path: Option<&str>) -> anyhow::Result<PathBuf> {
    let dir = match file_path {
        Some(path) => PathBuf::from(path),
        None => crate::utils::config::config_dir()?.join("logs"),
    };
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// 动态更新日志级别（热重载）
///
/// 仅调整日志级别，格式和输出目标的变更仍需要重新启动。
pub fn update_log_level(new_level: LogLevel) -> anyhow::Result<()> {
    let handle = LOG_LEVEL_HANDLE
        .get()
        .ok_or_else(|| anyhow::anyhow!("日志系统未初始化"))?;

    handle
        .reload(create_env_filter(new_level))
        .map_err(|e| anyhow::anyhow!("重载日志级别失败: {}", e))?;

    tracing::info!(new_level = new_level.as_str(), "日志级别已动态更新");
    Ok(())
}
