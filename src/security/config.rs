// 安全模块配置

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// 安全模块配置（持久化用）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// 主密码派生参数
    #[serde(default)]
    pub kdf: KdfConfig,
    /// 信任记录文件路径，为空时使用配置目录下的 trusted_hosts.json
    #[serde(default)]
    pub trust_store_file: Option<PathBuf>,
    /// 加载时丢弃已过期的证书
    #[serde(default = "default_true")]
    pub drop_expired_certificates: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            kdf: KdfConfig::default(),
            trust_store_file: None,
            drop_expired_certificates: true,
        }
    }
}

/// PBKDF2 派生参数
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfConfig {
    /// 迭代次数
    pub iterations: u32,
}

impl KdfConfig {
    /// 默认迭代次数
    pub const DEFAULT_ITERATIONS: u32 = 100_000;
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            iterations: Self::DEFAULT_ITERATIONS,
        }
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: SecurityConfig = serde_json::from_str(r#"{"kdf":{"iterations":10}}"#).unwrap();
        assert_eq!(config.kdf.iterations, 10);
        assert!(config.drop_expired_certificates);
        assert!(config.trust_store_file.is_none());

        let config: SecurityConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.kdf, KdfConfig::default());
    }
}
