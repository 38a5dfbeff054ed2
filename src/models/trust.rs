// 信任记录数据模型
// 用于存储已信任的服务器证书和已接受的不安全连接

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 已信任证书条目
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    /// 主机地址
    pub host: String,
    /// 端口
    pub port: u16,
    /// 信任相同 SAN 集合的后续证书（证书轮换时无需再次确认）
    #[serde(default)]
    pub trust_sans: bool,
    /// DER 编码的证书数据
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    /// 信任时间
    pub trusted_at: DateTime<Utc>,
    /// 证书过期时间（无法解析证书时为空）
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CertificateRecord {
    /// host / port 是否匹配
    pub fn is_for(&self, host: &str, port: u16) -> bool {
        self.host == host && self.port == port
    }

    /// 证书是否已过期
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |expires| expires < now)
    }
}

/// 已接受的不安全连接（未加密或未验证）
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InsecureHost {
    pub host: String,
    pub port: u16,
}

impl InsecureHost {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// 持久化的信任记录
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TrustRecords {
    #[serde(default)]
    pub certificates: Vec<CertificateRecord>,
    #[serde(default)]
    pub insecure_hosts: Vec<InsecureHost>,
}

mod base64_bytes {
    use base64::prelude::{Engine, BASE64_STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64_STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
