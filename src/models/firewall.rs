//! 防火墙原始数据结构
//!
//! 与 `networks.getEffectiveFirewalls` 返回的 JSON 一一对应，只做反序列化，
//! 不做任何解析校验。CIDR、端口等字段的解析在构造 `EffectiveFirewalls` 时进行。

use serde::{Deserialize, Serialize};

/// 流量方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Ingress,
    Egress,
}

/// 层级防火墙策略规则的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    Allow,
    Deny,
    GotoNext,
}

impl PolicyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyAction::Allow => "allow",
            PolicyAction::Deny => "deny",
            PolicyAction::GotoNext => "goto_next",
        }
    }
}

/// 网络的有效防火墙（层级策略 + VPC 规则）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveFirewallsPayload {
    /// 由外到内（组织 -> 文件夹）排列的层级策略
    #[serde(default, rename = "firewallPolicys")]
    pub firewall_policys: Vec<FirewallPolicyPayload>,
    #[serde(default)]
    pub firewalls: Vec<VpcRulePayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallPolicyPayload {
    pub short_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub rules: Vec<PolicyRulePayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRulePayload {
    pub priority: u32,
    pub direction: Direction,
    pub action: PolicyAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, rename = "match")]
    pub rule_match: PolicyMatchPayload,
    /// 部分接口版本把目标服务账号放在规则一级
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_service_accounts: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyMatchPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_ip_ranges: Option<Vec<String>>,
    #[serde(
        default,
        alias = "dstIpRanges",
        skip_serializing_if = "Option::is_none"
    )]
    pub dest_ip_ranges: Option<Vec<String>>,
    #[serde(default)]
    pub layer4_configs: Vec<Layer4ConfigPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_service_accounts: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer4ConfigPayload {
    pub ip_protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<String>>,
}

/// VPC 防火墙规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpcRulePayload {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub priority: u32,
    pub direction: Direction,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ranges: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_ranges: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_service_accounts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_service_accounts: Option<Vec<String>>,
    #[serde(default)]
    pub allowed: Vec<AllowDenyPayload>,
    #[serde(default)]
    pub denied: Vec<AllowDenyPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowDenyPayload {
    #[serde(rename = "IPProtocol")]
    pub ip_protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<String>>,
}
