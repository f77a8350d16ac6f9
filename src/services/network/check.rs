//! 连通性检查的输入与结果

use super::ip::IngressSource;
use std::fmt;

/// 最终判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FirewallAction {
    Allow,
    Deny,
}

impl FirewallAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FirewallAction::Allow => "allow",
            FirewallAction::Deny => "deny",
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, FirewallAction::Allow)
    }
}

impl fmt::Display for FirewallAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 做出判定的规则
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchedBy {
    /// 层级防火墙策略中的规则
    Policy {
        policy: String,
        rule_description: Option<String>,
        priority: u32,
    },
    /// VPC 防火墙规则
    VpcRule { id: String, name: String },
    /// 没有规则匹配，默认拒绝
    ImpliedDeny,
}

impl fmt::Display for MatchedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchedBy::Policy {
                policy,
                rule_description: Some(description),
                ..
            } if !description.is_empty() => write!(f, "policy: {policy}, rule: {description}"),
            MatchedBy::Policy { policy, .. } => write!(f, "policy: {policy}"),
            MatchedBy::VpcRule { name, .. } => write!(f, "vpc firewall rule: {name}"),
            MatchedBy::ImpliedDeny => f.write_str("implied deny"),
        }
    }
}

/// 连通性检查结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallCheckResult {
    pub action: FirewallAction,
    pub matched_by: MatchedBy,
}

impl FirewallCheckResult {
    pub(crate) fn implied_deny() -> Self {
        Self {
            action: FirewallAction::Deny,
            matched_by: MatchedBy::ImpliedDeny,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.action.is_allowed()
    }

    /// 判定来源的可读描述
    pub fn matched_by_str(&self) -> String {
        self.matched_by.to_string()
    }
}

impl fmt::Display for FirewallCheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action.as_str())
    }
}

/// 一次入站连通性检查
///
/// ```rust
/// let query = IngressQuery::new(src, "tcp", 22)
///     .target_service_account("gke-node@my-project.iam.gserviceaccount.com")
///     .target_tags(["gke-node"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressQuery {
    pub(crate) src: IngressSource,
    pub(crate) protocol: String,
    pub(crate) port: u16,
    pub(crate) source_service_account: Option<String>,
    pub(crate) source_tags: Vec<String>,
    pub(crate) target_service_account: Option<String>,
    pub(crate) target_tags: Vec<String>,
}

impl IngressQuery {
    pub fn new(src: impl Into<IngressSource>, protocol: &str, port: u16) -> Self {
        Self {
            src: src.into(),
            protocol: protocol.to_ascii_lowercase(),
            port,
            source_service_account: None,
            source_tags: Vec::new(),
            target_service_account: None,
            target_tags: Vec::new(),
        }
    }

    pub fn source_service_account(mut self, account: impl Into<String>) -> Self {
        self.source_service_account = Some(account.into());
        self
    }

    pub fn source_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn target_service_account(mut self, account: impl Into<String>) -> Self {
        self.target_service_account = Some(account.into());
        self
    }

    pub fn target_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn src(&self) -> &IngressSource {
        &self.src
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}
