// lib.rs - 诊断工具的核心库：数据获取缓存 + 网络可达性判定

pub mod core; // 核心基础设施层（日志）
pub mod data; // 统一数据获取缓存
pub mod models;
pub mod services;
pub mod utils;

pub use models::*;

pub use data::{ApiCache, CacheError, CacheOptions, CachedCall, CallError};
pub use services::network::{
    parse_network_url, EffectiveFirewalls, FirewallAction, FirewallCheckResult, FirewallError,
    FirewallSource, IngressQuery, IngressSource, IpNetwork, MatchedBy, NetworkQueries,
};

// 重新导出常用类型
pub use anyhow::{Context, Result};

pub use core::{init_logger, update_log_level};
