//! VPC 防火墙规则

use super::check::{FirewallAction, IngressQuery};
use super::error::Result;
use super::ip::{parse_ranges, IpNetwork, MatchMode};
use super::ports::{any_matches, Layer4Rule};
use crate::models::{AllowDenyPayload, Direction, VpcRulePayload};
use std::collections::HashSet;

/// 一条 VPC 防火墙规则（已解析）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpcFirewallRule {
    id: String,
    name: String,
    priority: u32,
    direction: Direction,
    disabled: bool,
    source_ranges: Option<Vec<IpNetwork>>,
    destination_ranges: Option<Vec<IpNetwork>>,
    source_tags: HashSet<String>,
    source_service_accounts: HashSet<String>,
    target_tags: Option<HashSet<String>>,
    target_service_accounts: Option<HashSet<String>>,
    allowed: Vec<Layer4Rule>,
    denied: Vec<Layer4Rule>,
}

/// 列表转集合；缺失或为空时视为“无限制”
fn restriction(values: &Option<Vec<String>>) -> Option<HashSet<String>> {
    values
        .as_ref()
        .filter(|values| !values.is_empty())
        .map(|values| values.iter().cloned().collect())
}

fn parse_l4(field: &'static str, entries: &[AllowDenyPayload]) -> Result<Vec<Layer4Rule>> {
    entries
        .iter()
        .map(|entry| Layer4Rule::parse(field, &entry.ip_protocol, entry.ports.as_deref()))
        .collect()
}

impl VpcFirewallRule {
    pub fn from_payload(payload: &VpcRulePayload) -> Result<Self> {
        let source_ranges = payload
            .source_ranges
            .as_deref()
            .map(|ranges| parse_ranges("sourceRanges", ranges))
            .transpose()?;
        let destination_ranges = payload
            .destination_ranges
            .as_deref()
            .map(|ranges| parse_ranges("destinationRanges", ranges))
            .transpose()?;

        Ok(Self {
            id: payload.id.clone(),
            name: payload.name.clone(),
            priority: payload.priority,
            direction: payload.direction,
            disabled: payload.disabled,
            source_ranges,
            destination_ranges,
            source_tags: restriction(&payload.source_tags).unwrap_or_default(),
            source_service_accounts: restriction(&payload.source_service_accounts)
                .unwrap_or_default(),
            target_tags: restriction(&payload.target_tags),
            target_service_accounts: restriction(&payload.target_service_accounts),
            allowed: parse_l4("allowed.ports", &payload.allowed)?,
            denied: parse_l4("denied.ports", &payload.denied)?,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }

    pub fn source_ranges(&self) -> &[IpNetwork] {
        self.source_ranges.as_deref().unwrap_or_default()
    }

    pub fn destination_ranges(&self) -> &[IpNetwork] {
        self.destination_ranges.as_deref().unwrap_or_default()
    }

    pub fn source_tags(&self) -> &HashSet<String> {
        &self.source_tags
    }

    pub fn source_service_accounts(&self) -> &HashSet<String> {
        &self.source_service_accounts
    }

    /// 目标标签；`None` 表示规则作用于所有实例
    pub fn target_tags(&self) -> Option<&HashSet<String>> {
        self.target_tags.as_ref()
    }

    pub fn target_service_accounts(&self) -> Option<&HashSet<String>> {
        self.target_service_accounts.as_ref()
    }

    pub fn allowed(&self) -> &[Layer4Rule] {
        &self.allowed
    }

    pub fn denied(&self) -> &[Layer4Rule] {
        &self.denied
    }

    /// 是否带有与 `tags` 相交的目标标签
    pub fn has_any_target_tag<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        self.target_tags
            .as_ref()
            .is_some_and(|own| tags.iter().any(|tag| own.contains(tag.as_ref())))
    }

    /// 协议和端口决定的候选动作：先看 `allowed`，再看 `denied`
    fn l4_action(&self, protocol: &str, port: u16) -> Option<FirewallAction> {
        if any_matches(&self.allowed, protocol, port) {
            Some(FirewallAction::Allow)
        } else if any_matches(&self.denied, protocol, port) {
            Some(FirewallAction::Deny)
        } else {
            None
        }
    }

    fn source_matches(&self, query: &IngressQuery, action: FirewallAction) -> bool {
        let mode = match action {
            FirewallAction::Allow => MatchMode::Contained,
            FirewallAction::Deny => MatchMode::Overlap,
        };

        if let Some(ranges) = &self.source_ranges {
            if query.src.matches_any(ranges, mode) {
                return true;
            }
        }
        if let Some(account) = &query.source_service_account {
            if self.source_service_accounts.contains(account) {
                return true;
            }
        }
        query
            .source_tags
            .iter()
            .any(|tag| self.source_tags.contains(tag))
    }

    fn target_matches(&self, query: &IngressQuery) -> bool {
        if let Some(accounts) = &self.target_service_accounts {
            match &query.target_service_account {
                Some(account) if accounts.contains(account) => {}
                _ => return false,
            }
        }
        match &self.target_tags {
            None => true,
            Some(_) => self.has_any_target_tag(&query.target_tags),
        }
    }

    /// 规则对入站查询的判定；不匹配时为 `None`
    fn ingress_verdict(&self, query: &IngressQuery) -> Option<FirewallAction> {
        if !self.is_enabled() {
            return None;
        }
        let action = self.l4_action(&query.protocol, query.port)?;
        (self.source_matches(query, action) && self.target_matches(query)).then_some(action)
    }
}

/// 一个网络的 VPC 防火墙规则集
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VpcFirewall {
    ingress: Vec<VpcFirewallRule>,
    egress: Vec<VpcFirewallRule>,
}

impl VpcFirewall {
    /// 解析规则，按优先级升序排列（同优先级保持原顺序）
    pub fn from_payload(rules: &[VpcRulePayload]) -> Result<Self> {
        let mut ingress = Vec::new();
        let mut egress = Vec::new();
        for rule in rules {
            let rule = VpcFirewallRule::from_payload(rule)?;
            match rule.direction {
                Direction::Ingress => ingress.push(rule),
                Direction::Egress => egress.push(rule),
            }
        }
        ingress.sort_by_key(VpcFirewallRule::priority);
        egress.sort_by_key(VpcFirewallRule::priority);
        Ok(Self { ingress, egress })
    }

    pub fn ingress_rules(&self) -> &[VpcFirewallRule] {
        &self.ingress
    }

    pub fn egress_rules(&self) -> &[VpcFirewallRule] {
        &self.egress
    }

    /// 第一条匹配的入站规则及其动作
    pub fn first_ingress_match(
        &self,
        query: &IngressQuery,
    ) -> Option<(&VpcFirewallRule, FirewallAction)> {
        let matched = self
            .ingress
            .iter()
            .find_map(|rule| rule.ingress_verdict(query).map(|action| (rule, action)));

        match &matched {
            Some((rule, action)) => tracing::debug!(
                src = %query.src,
                port = query.port,
                protocol = %query.protocol,
                action = action.as_str(),
                rule = %rule.name,
                "VPC 防火墙规则匹配"
            ),
            None => tracing::debug!(
                src = %query.src,
                port = query.port,
                protocol = %query.protocol,
                "没有 VPC 防火墙规则匹配，使用隐含拒绝"
            ),
        }

        matched
    }

    pub fn verify_ingress_rule_exists(&self, name: &str) -> bool {
        self.ingress.iter().any(|rule| rule.name == name)
    }
}
