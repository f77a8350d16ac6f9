//! 层级防火墙策略（组织 / 文件夹）

use super::check::IngressQuery;
use super::error::Result;
use super::ip::{parse_ranges, IpNetwork, MatchMode};
use super::ports::{any_matches, Layer4Rule};
use crate::models::{Direction, FirewallPolicyPayload, PolicyAction, PolicyRulePayload};
use std::collections::HashSet;

/// 异常情况专用的日志 target
pub const ANOMALY_TARGET: &str = "vpcdiag::anomaly";

/// 策略中的一条规则（已解析）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRule {
    priority: u32,
    direction: Direction,
    action: PolicyAction,
    description: Option<String>,
    disabled: bool,
    src_ip_ranges: Vec<IpNetwork>,
    dest_ip_ranges: Vec<IpNetwork>,
    layer4_configs: Vec<Layer4Rule>,
    target_service_accounts: Option<HashSet<String>>,
}

impl PolicyRule {
    pub fn from_payload(payload: &PolicyRulePayload) -> Result<Self> {
        let m = &payload.rule_match;

        let src_ip_ranges = match &m.src_ip_ranges {
            Some(ranges) => parse_ranges("srcIpRanges", ranges)?,
            None => Vec::new(),
        };
        let dest_ip_ranges = match &m.dest_ip_ranges {
            Some(ranges) => parse_ranges("destIpRanges", ranges)?,
            None => Vec::new(),
        };
        let layer4_configs = m
            .layer4_configs
            .iter()
            .map(|l4| Layer4Rule::parse("layer4Configs.ports", &l4.ip_protocol, l4.ports.as_deref()))
            .collect::<Result<Vec<_>>>()?;

        // 规则级与 match 级的目标服务账号合并
        let target_service_accounts: HashSet<String> = payload
            .target_service_accounts
            .iter()
            .chain(m.target_service_accounts.iter())
            .flatten()
            .cloned()
            .collect();

        Ok(Self {
            priority: payload.priority,
            direction: payload.direction,
            action: payload.action,
            description: payload.description.clone(),
            disabled: payload.disabled,
            src_ip_ranges,
            dest_ip_ranges,
            layer4_configs,
            target_service_accounts: (!target_service_accounts.is_empty())
                .then_some(target_service_accounts),
        })
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn action(&self) -> PolicyAction {
        self.action
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }

    pub fn src_ip_ranges(&self) -> &[IpNetwork] {
        &self.src_ip_ranges
    }

    pub fn dest_ip_ranges(&self) -> &[IpNetwork] {
        &self.dest_ip_ranges
    }

    pub fn layer4_configs(&self) -> &[Layer4Rule] {
        &self.layer4_configs
    }

    pub fn target_service_accounts(&self) -> Option<&HashSet<String>> {
        self.target_service_accounts.as_ref()
    }

    /// 入站规则是否匹配
    ///
    /// 拒绝规则只要来源与规则网段有交集就匹配，放行和 `goto_next` 规则要求来源完全包含在内。
    fn matches_ingress(&self, query: &IngressQuery) -> bool {
        if !self.is_enabled() {
            return false;
        }

        let mode = match self.action {
            PolicyAction::Deny => MatchMode::Overlap,
            PolicyAction::Allow | PolicyAction::GotoNext => MatchMode::Contained,
        };
        if !query.src.matches_any(&self.src_ip_ranges, mode) {
            return false;
        }

        if !any_matches(&self.layer4_configs, &query.protocol, query.port) {
            return false;
        }

        match (&self.target_service_accounts, &query.target_service_account) {
            (None, _) => true,
            (Some(accounts), Some(account)) => accounts.contains(account),
            (Some(_), None) => false,
        }
    }
}

/// 一个层级防火墙策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallPolicy {
    short_name: String,
    name: Option<String>,
    ingress: Vec<PolicyRule>,
    egress: Vec<PolicyRule>,
}

impl FirewallPolicy {
    /// 解析策略，规则按优先级升序排列（同优先级保持原顺序）
    pub fn from_payload(payload: &FirewallPolicyPayload) -> Result<Self> {
        let mut ingress = Vec::new();
        let mut egress = Vec::new();
        for rule in &payload.rules {
            let rule = PolicyRule::from_payload(rule)?;
            match rule.direction {
                Direction::Ingress => ingress.push(rule),
                Direction::Egress => egress.push(rule),
            }
        }
        ingress.sort_by_key(PolicyRule::priority);
        egress.sort_by_key(PolicyRule::priority);

        Ok(Self {
            short_name: payload.short_name.clone(),
            name: payload.name.clone(),
            ingress,
            egress,
        })
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn ingress_rules(&self) -> &[PolicyRule] {
        &self.ingress
    }

    pub fn egress_rules(&self) -> &[PolicyRule] {
        &self.egress
    }

    /// 第一条匹配的入站规则
    ///
    /// 正常的策略最后总有一条兜底的 `goto_next` 规则；没有规则匹配时记录异常并返回 `None`。
    pub fn first_ingress_match(&self, query: &IngressQuery) -> Option<&PolicyRule> {
        let matched = self.ingress.iter().find(|rule| rule.matches_ingress(query));

        match matched {
            Some(rule) => tracing::debug!(
                policy = %self.short_name,
                src = %query.src,
                port = query.port,
                protocol = %query.protocol,
                action = rule.action.as_str(),
                priority = rule.priority,
                "防火墙策略规则匹配"
            ),
            None => tracing::warn!(
                target: ANOMALY_TARGET,
                policy = %self.short_name,
                src = %query.src,
                port = query.port,
                protocol = %query.protocol,
                "防火墙策略中没有任何规则匹配"
            ),
        }

        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Layer4ConfigPayload, PolicyMatchPayload};
    use crate::services::network::ip::IngressSource;

    fn rule(priority: u32, action: PolicyAction, src: &[&str]) -> PolicyRulePayload {
        PolicyRulePayload {
            priority,
            direction: Direction::Ingress,
            action,
            description: Some(format!("rule-{priority}")),
            disabled: false,
            rule_match: PolicyMatchPayload {
                src_ip_ranges: Some(src.iter().map(|s| s.to_string()).collect()),
                dest_ip_ranges: None,
                layer4_configs: vec![Layer4ConfigPayload {
                    ip_protocol: "tcp".to_string(),
                    ports: None,
                }],
                target_service_accounts: None,
            },
            target_service_accounts: None,
        }
    }

    fn policy(rules: Vec<PolicyRulePayload>) -> FirewallPolicy {
        FirewallPolicy::from_payload(&FirewallPolicyPayload {
            short_name: "org-policy".to_string(),
            name: None,
            rules,
        })
        .unwrap()
    }

    fn query(src: &str) -> IngressQuery {
        IngressQuery::new(src.parse::<IngressSource>().unwrap(), "tcp", 22)
    }

    #[test]
    fn test_rules_sorted_by_priority() {
        let p = policy(vec![
            rule(300, PolicyAction::Allow, &["0.0.0.0/0"]),
            rule(100, PolicyAction::Deny, &["0.0.0.0/0"]),
            rule(200, PolicyAction::GotoNext, &["0.0.0.0/0"]),
        ]);
        let priorities: Vec<u32> = p.ingress_rules().iter().map(PolicyRule::priority).collect();
        assert_eq!(priorities, vec![100, 200, 300]);
    }

    #[test]
    fn test_direction_split() {
        let mut egress = rule(10, PolicyAction::Allow, &["0.0.0.0/0"]);
        egress.direction = Direction::Egress;
        let p = policy(vec![egress, rule(20, PolicyAction::Allow, &["0.0.0.0/0"])]);
        assert_eq!(p.ingress_rules().len(), 1);
        assert_eq!(p.egress_rules().len(), 1);
    }

    #[test]
    fn test_disabled_rule_is_skipped() {
        let mut disabled = rule(100, PolicyAction::Deny, &["0.0.0.0/0"]);
        disabled.disabled = true;
        let p = policy(vec![disabled, rule(200, PolicyAction::Allow, &["0.0.0.0/0"])]);

        let matched = p.first_ingress_match(&query("10.0.0.1")).unwrap();
        assert_eq!(matched.action(), PolicyAction::Allow);
    }

    #[test]
    fn test_rule_without_src_ranges_never_matches() {
        let mut no_src = rule(100, PolicyAction::Deny, &[]);
        no_src.rule_match.src_ip_ranges = None;
        let p = policy(vec![no_src]);
        assert!(p.first_ingress_match(&query("10.0.0.1")).is_none());
    }

    #[test]
    fn test_target_service_account_restriction() {
        let mut restricted = rule(100, PolicyAction::Deny, &["0.0.0.0/0"]);
        restricted.target_service_accounts = Some(vec!["sa-1@example.com".to_string()]);
        let p = policy(vec![restricted, rule(200, PolicyAction::Allow, &["0.0.0.0/0"])]);

        // 查询未指定服务账号时，受限规则不匹配
        let matched = p.first_ingress_match(&query("10.0.0.1")).unwrap();
        assert_eq!(matched.priority(), 200);

        let matched = p
            .first_ingress_match(&query("10.0.0.1").target_service_account("sa-1@example.com"))
            .unwrap();
        assert_eq!(matched.priority(), 100);

        let matched = p
            .first_ingress_match(&query("10.0.0.1").target_service_account("sa-2@example.com"))
            .unwrap();
        assert_eq!(matched.priority(), 200);
    }

    #[test]
    fn test_match_level_target_service_accounts() {
        let mut restricted = rule(100, PolicyAction::Allow, &["0.0.0.0/0"]);
        restricted.rule_match.target_service_accounts = Some(vec!["sa@example.com".to_string()]);
        let parsed = PolicyRule::from_payload(&restricted).unwrap();
        assert!(parsed
            .target_service_accounts()
            .is_some_and(|accounts| accounts.contains("sa@example.com")));
    }

    #[test]
    fn test_invalid_src_range_names_field() {
        let bad = rule(100, PolicyAction::Allow, &["10.0.0.0/99"]);
        let err = PolicyRule::from_payload(&bad).unwrap_err();
        assert!(err.to_string().contains("srcIpRanges"));
    }

    #[test]
    fn test_no_match_returns_none() {
        let p = policy(vec![rule(100, PolicyAction::Allow, &["192.168.0.0/16"])]);
        assert!(p.first_ingress_match(&query("10.0.0.1")).is_none());
    }
}
