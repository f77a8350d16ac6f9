//! 调用指纹
//!
//! 指纹由调用点名称和参数的 SHA-256 摘要组成，用作缓存键与键级锁的标识。
//! 参数先经 `bincode` 编码再做摘要，相同参数总能得到相同指纹。
//!
//! 注意：参数里如果含有 `HashMap` 之类迭代顺序不稳定的容器，请换成 `BTreeMap`，
//! 否则相等的参数可能得到不同的指纹（只会导致缓存未命中，不影响正确性）。

use crate::data::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// 一次可记忆化调用的确定性标识
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    call_site: String,
    digest: [u8; 32],
}

impl Fingerprint {
    /// 计算指纹
    ///
    /// # 参数
    ///
    /// - `call_site`: 调用点名称（通常是 `模块::函数`）
    /// - `args`: 调用参数，多个参数用元组传入
    pub fn new<A: Serialize + ?Sized>(call_site: &str, args: &A) -> Result<Self> {
        let encoded = bincode::serialize(args)?;
        let mut hasher = Sha256::new();
        hasher.update(&encoded);
        Ok(Self {
            call_site: call_site.to_string(),
            digest: hasher.finalize().into(),
        })
    }

    /// 调用点名称
    pub fn call_site(&self) -> &str {
        &self.call_site
    }

    /// 参数摘要的十六进制形式
    pub fn digest_hex(&self) -> String {
        self.digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// 存储层使用的键：`<调用点>:<摘要>`
    ///
    /// 调用点保持明文，方便直接查看数据库排查问题。
    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.call_site, self.digest_hex())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.storage_key())
    }
}
