//! 网络的有效防火墙
//!
//! 组合层级防火墙策略与 VPC 防火墙规则，按云平台的判定顺序回答
//! “这条入站流量能否进入该网络”：
//!
//! 1. 层级策略按给定顺序（组织在前、文件夹在后）依次判定，
//!    `allow` / `deny` 直接返回，`goto_next` 交给下一层
//! 2. VPC 防火墙规则按优先级判定，第一条匹配的规则生效
//! 3. 都没有匹配时隐含拒绝
//!
//! 构造完成后不可变，可在线程间共享。
//!
//! # 使用示例
//!
//! ```rust
//! use crate::services::network::{EffectiveFirewalls, IngressQuery};
//!
//! let firewalls = EffectiveFirewalls::from_json(&response_body)?;
//! let result = firewalls.check_connectivity_ingress(
//!     &IngressQuery::new("35.191.0.0/16".parse()?, "tcp", 80).target_tags(["gke-node"]),
//! );
//! println!("{} ({})", result, result.matched_by_str());
//! ```

use super::check::{FirewallAction, FirewallCheckResult, IngressQuery, MatchedBy};
use super::error::{FirewallError, Result};
use super::policy::FirewallPolicy;
use super::vpc::{VpcFirewall, VpcFirewallRule};
use crate::models::{EffectiveFirewallsPayload, PolicyAction};
use regex::Regex;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectiveFirewalls {
    policies: Vec<FirewallPolicy>,
    vpc_firewall: VpcFirewall,
}

impl EffectiveFirewalls {
    pub fn new(policies: Vec<FirewallPolicy>, vpc_firewall: VpcFirewall) -> Self {
        Self {
            policies,
            vpc_firewall,
        }
    }

    /// 从原始数据构造，所有网段和端口在这里一次性解析
    pub fn from_payload(payload: &EffectiveFirewallsPayload) -> Result<Self> {
        let policies = payload
            .firewall_policys
            .iter()
            .map(FirewallPolicy::from_payload)
            .collect::<Result<Vec<_>>>()?;
        let vpc_firewall = VpcFirewall::from_payload(&payload.firewalls)?;

        tracing::debug!(
            policies = policies.len(),
            vpc_ingress_rules = vpc_firewall.ingress_rules().len(),
            vpc_egress_rules = vpc_firewall.egress_rules().len(),
            "有效防火墙已加载"
        );

        Ok(Self::new(policies, vpc_firewall))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let payload: EffectiveFirewallsPayload = serde_json::from_str(json)?;
        Self::from_payload(&payload)
    }

    /// 层级策略，按判定顺序
    pub fn policies(&self) -> &[FirewallPolicy] {
        &self.policies
    }

    pub fn vpc_firewall(&self) -> &VpcFirewall {
        &self.vpc_firewall
    }

    /// 入站连通性检查
    pub fn check_connectivity_ingress(&self, query: &IngressQuery) -> FirewallCheckResult {
        for policy in &self.policies {
            // 没有规则匹配按 goto_next 处理（已在策略内记录异常）
            let Some(rule) = policy.first_ingress_match(query) else {
                continue;
            };

            let action = match rule.action() {
                PolicyAction::Allow => FirewallAction::Allow,
                PolicyAction::Deny => FirewallAction::Deny,
                PolicyAction::GotoNext => continue,
            };
            return FirewallCheckResult {
                action,
                matched_by: MatchedBy::Policy {
                    policy: policy.short_name().to_string(),
                    rule_description: rule.description().map(str::to_string),
                    priority: rule.priority(),
                },
            };
        }

        match self.vpc_firewall.first_ingress_match(query) {
            Some((rule, action)) => FirewallCheckResult {
                action,
                matched_by: MatchedBy::VpcRule {
                    id: rule.id().to_string(),
                    name: rule.name().to_string(),
                },
            },
            None => FirewallCheckResult::implied_deny(),
        }
    }

    /// 按名称或名称模式查找 VPC 入站规则
    ///
    /// - `name`: 精确匹配，优先于 `name_pattern`
    /// - `name_pattern`: 从名称开头匹配
    /// - `target_tags`: 只保留目标标签与之相交的规则；`None` 或空表示不过滤
    ///
    /// `name` 与 `name_pattern` 都未提供时返回 `InvalidArgument`。
    pub fn get_vpc_ingress_rules(
        &self,
        name: Option<&str>,
        name_pattern: Option<&Regex>,
        target_tags: Option<&[&str]>,
    ) -> Result<Vec<&VpcFirewallRule>> {
        let name = name.filter(|name| !name.is_empty());
        if name.is_none() && name_pattern.is_none() {
            return Err(FirewallError::InvalidArgument(
                "必须提供 name 或 name_pattern".to_string(),
            ));
        }
        let target_tags = target_tags.filter(|tags| !tags.is_empty());

        let rules = self
            .vpc_firewall
            .ingress_rules()
            .iter()
            .filter(|rule| match (name, name_pattern) {
                (Some(name), _) => rule.name() == name,
                (None, Some(pattern)) => matches_from_start(pattern, rule.name()),
                (None, None) => false,
            })
            .filter(|rule| target_tags.map_or(true, |tags| rule.has_any_target_tag(tags)))
            .collect();

        Ok(rules)
    }

    /// 指定名称的 VPC 入站规则是否存在（包括已禁用的规则）
    ///
    /// 共享 VPC 缺少权限时，平台自动创建的规则可能不存在，可用来判断这类情况。
    pub fn verify_ingress_rule_exists(&self, name: &str) -> bool {
        self.vpc_firewall.verify_ingress_rule_exists(name)
    }
}

fn matches_from_start(pattern: &Regex, text: &str) -> bool {
    pattern.find(text).is_some_and(|m| m.start() == 0)
}
