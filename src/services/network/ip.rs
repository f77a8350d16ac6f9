//! IP 网段与匹配规则
//!
//! 只实现防火墙判定需要的运算：包含、子网、重叠。IPv4 与 IPv6 之间永远不匹配。

use super::error::{FirewallError, Result};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// CIDR 网段
///
/// 解析是严格的：主机位不为零的 CIDR（如 `10.0.0.1/8`）视为错误；
/// 不带前缀的地址视为单地址网段（`/32` 或 `/128`）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpNetwork {
    addr: IpAddr,
    prefix: u8,
}

impl IpNetwork {
    /// 构造网段，主机位必须为零
    pub fn new(addr: IpAddr, prefix: u8) -> std::result::Result<Self, String> {
        let bits = address_bits(&addr);
        if prefix > bits {
            return Err(format!("前缀长度 {prefix} 超过 {bits}"));
        }
        let network = Self { addr, prefix };
        if to_bits(&addr) & !network.mask() != 0 {
            return Err("主机位不为零".to_string());
        }
        Ok(network)
    }

    /// 网络地址
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }

    /// 地址是否落在网段内
    pub fn contains(&self, addr: IpAddr) -> bool {
        same_family(&self.addr, &addr) && to_bits(&addr) & self.mask() == to_bits(&self.addr)
    }

    /// `self` 是否是 `other` 的子网（含相等）
    pub fn subnet_of(&self, other: &IpNetwork) -> bool {
        self.prefix >= other.prefix && other.contains(self.addr)
    }

    /// 两个网段是否有交集
    pub fn overlaps(&self, other: &IpNetwork) -> bool {
        self.contains(other.addr) || other.contains(self.addr)
    }

    fn mask(&self) -> u128 {
        let bits = address_bits(&self.addr);
        if self.prefix == 0 {
            return 0;
        }
        let full = if bits == 128 {
            u128::MAX
        } else {
            (1u128 << bits) - 1
        };
        (u128::MAX << (bits - self.prefix)) & full
    }
}

impl FromStr for IpNetwork {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('/') {
            Some((addr, prefix)) => {
                let addr: IpAddr = addr.parse().map_err(|e| format!("{e}"))?;
                let prefix: u8 = prefix
                    .parse()
                    .map_err(|_| format!("无效的前缀长度 {prefix:?}"))?;
                Self::new(addr, prefix)
            }
            None => {
                let addr: IpAddr = s.parse().map_err(|e| format!("{e}"))?;
                Ok(Self {
                    addr,
                    prefix: address_bits(&addr),
                })
            }
        }
    }
}

impl fmt::Display for IpNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

impl From<IpAddr> for IpNetwork {
    fn from(addr: IpAddr) -> Self {
        Self {
            addr,
            prefix: address_bits(&addr),
        }
    }
}

/// 解析一组 CIDR，出错时指明字段名
pub(crate) fn parse_ranges(field: &'static str, values: &[String]) -> Result<Vec<IpNetwork>> {
    values
        .iter()
        .map(|value| {
            value
                .parse::<IpNetwork>()
                .map_err(|reason| FirewallError::parse(field, value, reason))
        })
        .collect()
}

/// 入站流量的来源：单个地址或一个网段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IngressSource {
    Addr(IpAddr),
    Net(IpNetwork),
}

/// 来源网段与规则网段的匹配方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// 来源网段必须完全落在规则网段内（放行类规则）
    Contained,
    /// 来源网段与规则网段有交集即可（拒绝类规则）
    Overlap,
}

impl IngressSource {
    /// 是否与 `ranges` 中任一网段匹配
    ///
    /// 单个地址始终按包含判断，与 `mode` 无关。
    pub fn matches_any(&self, ranges: &[IpNetwork], mode: MatchMode) -> bool {
        ranges.iter().any(|range| match self {
            IngressSource::Addr(addr) => range.contains(*addr),
            IngressSource::Net(net) => match mode {
                MatchMode::Contained => net.subnet_of(range),
                MatchMode::Overlap => net.overlaps(range),
            },
        })
    }
}

impl FromStr for IngressSource {
    type Err = FirewallError;

    fn from_str(s: &str) -> Result<Self> {
        if s.contains('/') {
            s.parse::<IpNetwork>()
                .map(IngressSource::Net)
                .map_err(|reason| FirewallError::parse("src_ip", s, reason))
        } else {
            s.trim()
                .parse::<IpAddr>()
                .map(IngressSource::Addr)
                .map_err(|e| FirewallError::parse("src_ip", s, e))
        }
    }
}

impl From<IpAddr> for IngressSource {
    fn from(addr: IpAddr) -> Self {
        IngressSource::Addr(addr)
    }
}

impl From<IpNetwork> for IngressSource {
    fn from(net: IpNetwork) -> Self {
        IngressSource::Net(net)
    }
}

impl fmt::Display for IngressSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngressSource::Addr(addr) => write!(f, "{addr}"),
            IngressSource::Net(net) => write!(f, "{net}"),
        }
    }
}

fn address_bits(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn to_bits(addr: &IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => u128::from(u32::from(*v4)),
        IpAddr::V6(v6) => u128::from(*v6),
    }
}

fn same_family(a: &IpAddr, b: &IpAddr) -> bool {
    a.is_ipv4() == b.is_ipv4()
}
