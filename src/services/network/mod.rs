//! 网络入站可达性判定
//!
//! - `ip` / `ports`: 网段与端口匹配
//! - `policy`: 层级防火墙策略（组织 / 文件夹）
//! - `vpc`: VPC 防火墙规则
//! - `effective`: 组合判定入口 `EffectiveFirewalls`
//! - `query`: 带缓存的数据获取

pub mod check;
pub mod effective;
pub mod error;
pub mod ip;
pub mod policy;
pub mod ports;
pub mod query;
pub mod vpc;


pub use check::{FirewallAction, FirewallCheckResult, IngressQuery, MatchedBy};
pub use effective::EffectiveFirewalls;
pub use error::FirewallError;
pub use ip::{IngressSource, IpNetwork, MatchMode};
pub use policy::{FirewallPolicy, PolicyRule, ANOMALY_TARGET};
pub use ports::{Layer4Rule, PortRange};
pub use query::{parse_network_url, FirewallSource, NetworkQueries, NetworkRef};
pub use vpc::{VpcFirewall, VpcFirewallRule};
