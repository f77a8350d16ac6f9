//! 协议与端口匹配

use super::error::{FirewallError, Result};
use std::fmt;
use std::str::FromStr;

/// 匹配所有协议的特殊值
pub const ALL_PROTOCOLS: &str = "all";

/// 端口或闭区间端口范围（`"80"`、`"8000-9000"`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRange {
    start: u16,
    end: u16,
}

impl PortRange {
    pub fn single(port: u16) -> Self {
        Self {
            start: port,
            end: port,
        }
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    /// 端口是否在范围内（含两端）；起点大于终点的范围不匹配任何端口
    pub fn contains(&self, port: u16) -> bool {
        self.start <= port && port <= self.end
    }
}

impl FromStr for PortRange {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parse_port = |part: &str| {
            part.trim()
                .parse::<u16>()
                .map_err(|_| format!("无效的端口号 {part:?}"))
        };

        match s.split_once('-') {
            Some((start, end)) => Ok(Self {
                start: parse_port(start)?,
                end: parse_port(end)?,
            }),
            None => parse_port(s).map(Self::single),
        }
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// 一条四层匹配条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer4Rule {
    protocol: String,
    /// `None` 表示所有端口
    ports: Option<Vec<PortRange>>,
}

impl Layer4Rule {
    /// 解析协议与端口列表
    ///
    /// 协议统一转为小写；空端口列表与未指定端口等价。
    pub fn parse(field: &'static str, protocol: &str, ports: Option<&[String]>) -> Result<Self> {
        let ports = match ports {
            Some(ports) if !ports.is_empty() => Some(
                ports
                    .iter()
                    .map(|p| {
                        p.parse::<PortRange>()
                            .map_err(|reason| FirewallError::parse(field, p, reason))
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            _ => None,
        };

        Ok(Self {
            protocol: protocol.to_ascii_lowercase(),
            ports,
        })
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn ports(&self) -> Option<&[PortRange]> {
        self.ports.as_deref()
    }

    /// `protocol` 需为小写
    pub fn matches(&self, protocol: &str, port: u16) -> bool {
        if self.protocol != protocol && self.protocol != ALL_PROTOCOLS {
            return false;
        }
        match &self.ports {
            None => true,
            Some(ranges) => ranges.iter().any(|range| range.contains(port)),
        }
    }
}

/// 是否有任一条件匹配
pub(crate) fn any_matches(rules: &[Layer4Rule], protocol: &str, port: u16) -> bool {
    rules.iter().any(|rule| rule.matches(protocol, port))
}
