use thiserror::Error;

/// 防火墙数据解析与查询错误
#[derive(Error, Debug)]
pub enum FirewallError {
    /// 字段值无法解析（CIDR、端口范围等）
    #[error("无法解析 {field} 的值 {value:?}: {reason}")]
    Parse {
        field: &'static str,
        value: String,
        reason: String,
    },

    /// 原始 JSON 结构不符合预期
    #[error("防火墙数据格式错误: {0}")]
    Payload(#[from] serde_json::Error),

    /// 调用参数不合法
    #[error("参数错误: {0}")]
    InvalidArgument(String),

    #[error("无法解析网络 URL: {0}")]
    InvalidNetworkUrl(String),
}

impl FirewallError {
    pub fn parse(field: &'static str, value: &str, reason: impl ToString) -> Self {
        Self::Parse {
            field,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FirewallError>;
