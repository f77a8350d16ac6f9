// 服务层模块
//
// - network: 网络入站可达性判定（层级防火墙策略 + VPC 防火墙规则）

pub mod network;

pub use network::{
    EffectiveFirewalls, FirewallAction, FirewallCheckResult, FirewallError, FirewallSource,
    IngressQuery, MatchedBy, NetworkQueries,
};
