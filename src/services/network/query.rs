//! 网络相关的数据获取
//!
//! 上游接口由调用方通过 [`FirewallSource`] 注入，这里负责用缓存包装它，
//! 并把原始数据构造成 [`EffectiveFirewalls`]。

use super::effective::EffectiveFirewalls;
use super::error::FirewallError;
use crate::data::{ApiCache, CacheOptions, CachedCall, CallError};
use crate::models::EffectiveFirewallsPayload;
use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

static NETWORK_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://www\.googleapis\.com/compute/v1/projects/([^/]+)/global/networks/([^/]+)")
        .expect("invalid network url regex")
});

/// 有效防火墙数据源
pub trait FirewallSource: Send + Sync {
    /// 获取网络的有效防火墙（层级策略 + VPC 规则）
    fn effective_firewalls(
        &self,
        project_id: &str,
        network: &str,
    ) -> anyhow::Result<EffectiveFirewallsPayload>;
}

/// 项目 + 网络名
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkRef {
    pub project_id: String,
    pub network: String,
}

/// 解析网络的 self link
///
/// 格式：`https://www.googleapis.com/compute/v1/projects/{project}/global/networks/{network}`
pub fn parse_network_url(url: &str) -> Result<NetworkRef, FirewallError> {
    let captures = NETWORK_URL_RE
        .captures(url)
        .ok_or_else(|| FirewallError::InvalidNetworkUrl(url.to_string()))?;

    Ok(NetworkRef {
        project_id: captures[1].to_string(),
        network: captures[2].to_string(),
    })
}

/// 带缓存的网络查询
pub struct NetworkQueries {
    effective_firewalls: CachedCall<(String, String), EffectiveFirewallsPayload, anyhow::Error>,
}

impl NetworkQueries {
    pub fn new(cache: &Arc<ApiCache>, source: Arc<dyn FirewallSource>) -> Self {
        let effective_firewalls = cache.wrap(
            "network::get_effective_firewalls",
            CacheOptions::session(),
            move |(project_id, network): &(String, String)| {
                tracing::info!(project_id = %project_id, network = %network, "获取有效防火墙");
                source.effective_firewalls(project_id, network)
            },
        );

        Self {
            effective_firewalls,
        }
    }

    /// 获取网络的有效防火墙
    ///
    /// 原始数据在本次运行内缓存；构造失败（CIDR、端口无法解析）不会影响缓存内容。
    pub fn effective_firewalls(
        &self,
        project_id: &str,
        network: &str,
    ) -> anyhow::Result<EffectiveFirewalls> {
        let args = (project_id.to_string(), network.to_string());
        let payload = self.effective_firewalls.call(&args).map_err(|e| match e {
            CallError::Upstream(e) => e,
            timeout @ CallError::LockTimeout { .. } => anyhow::Error::new(timeout),
        })?;

        EffectiveFirewalls::from_payload(&payload)
            .with_context(|| format!("解析网络 {project_id}/{network} 的防火墙规则失败"))
    }

    /// 通过网络的 self link 获取有效防火墙
    pub fn effective_firewalls_for_url(&self, url: &str) -> anyhow::Result<EffectiveFirewalls> {
        let network = parse_network_url(url)?;
        self.effective_firewalls(&network.project_id, &network.network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AllowDenyPayload, CacheSettings, Direction, VpcRulePayload};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FakeSource {
        calls: AtomicUsize,
        payload: EffectiveFirewallsPayload,
    }

    impl FirewallSource for FakeSource {
        fn effective_firewalls(
            &self,
            project_id: &str,
            _network: &str,
        ) -> anyhow::Result<EffectiveFirewallsPayload> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if project_id == "forbidden" {
                anyhow::bail!("403: permission denied on {project_id}");
            }
            Ok(self.payload.clone())
        }
    }

    fn fake_source(source_range: &str) -> Arc<FakeSource> {
        Arc::new(FakeSource {
            calls: AtomicUsize::new(0),
            payload: EffectiveFirewallsPayload {
                firewall_policys: vec![],
                firewalls: vec![VpcRulePayload {
                    id: "7".to_string(),
                    name: "allow-health-checks".to_string(),
                    priority: 1000,
                    direction: Direction::Ingress,
                    disabled: false,
                    source_ranges: Some(vec![source_range.to_string()]),
                    destination_ranges: None,
                    source_tags: None,
                    source_service_accounts: None,
                    target_tags: None,
                    target_service_accounts: None,
                    allowed: vec![AllowDenyPayload {
                        ip_protocol: "tcp".to_string(),
                        ports: None,
                    }],
                    denied: vec![],
                }],
            },
        })
    }

    #[test]
    fn test_parse_network_url() {
        let parsed = parse_network_url(
            "https://www.googleapis.com/compute/v1/projects/my-project/global/networks/default",
        )
        .unwrap();
        assert_eq!(parsed.project_id, "my-project");
        assert_eq!(parsed.network, "default");
    }

    #[test]
    fn test_parse_network_url_rejects_other_urls() {
        for url in [
            "https://www.googleapis.com/compute/v1/projects/my-project/regions/us-central1/subnetworks/default",
            "projects/my-project/global/networks/default",
            "",
        ] {
            assert!(matches!(
                parse_network_url(url),
                Err(FirewallError::InvalidNetworkUrl(_))
            ));
        }
    }

    #[test]
    fn test_effective_firewalls_are_cached() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ApiCache::open(CacheSettings::in_dir(temp_dir.path())).unwrap();
        let source = fake_source("130.211.0.0/22");
        let queries = NetworkQueries::new(&cache, source.clone());

        let fw = queries.effective_firewalls("my-project", "default").unwrap();
        assert!(fw.verify_ingress_rule_exists("allow-health-checks"));
        queries
            .effective_firewalls_for_url(
                "https://www.googleapis.com/compute/v1/projects/my-project/global/networks/default",
            )
            .unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        queries.effective_firewalls("my-project", "other").unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_queries_on_one_cache_share_results() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ApiCache::open(CacheSettings::in_dir(temp_dir.path())).unwrap();
        let source = fake_source("130.211.0.0/22");
        let first = NetworkQueries::new(&cache, source.clone());
        let second = NetworkQueries::new(&cache, source.clone());

        first.effective_firewalls("my-project", "default").unwrap();
        second.effective_firewalls("my-project", "default").unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_upstream_error_is_propagated() {
        let cache = ApiCache::ephemeral(CacheSettings::default());
        let source = fake_source("130.211.0.0/22");
        let queries = NetworkQueries::new(&cache, source.clone());

        let err = queries.effective_firewalls("forbidden", "default").unwrap_err();
        assert!(err.to_string().contains("403"));
        queries.effective_firewalls("forbidden", "default").unwrap_err();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unparseable_payload_is_error() {
        let cache = ApiCache::ephemeral(CacheSettings::default());
        let queries = NetworkQueries::new(&cache, fake_source("not-a-cidr"));

        let err = queries.effective_firewalls("my-project", "default").unwrap_err();
        assert!(err.to_string().contains("my-project/default"));
        assert!(err.root_cause().to_string().contains("sourceRanges"));
    }

    #[test]
    fn test_invalid_url_is_error() {
        let cache = ApiCache::ephemeral(CacheSettings::default());
        let queries = NetworkQueries::new(&cache, fake_source("0.0.0.0/0"));
        let err = queries.effective_firewalls_for_url("default").unwrap_err();
        assert!(err.downcast_ref::<FirewallError>().is_some());
    }
}
