// 站点与登录身份数据结构

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::security::crypto::{EncryptedPassword, PrivateKey, PublicKey};
use crate::security::error::SecurityError;

/// 登录方式
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum LogonType {
    /// 匿名登录，从不缓存密码
    Anonymous,
    /// 使用站点中保存的密码
    #[default]
    Normal,
    /// 每次会话询问密码
    Ask,
    /// 交互式键盘认证（服务器下发 challenge）
    Interactive,
    /// 密钥认证
    Key,
}

/// 服务器身份（host / port / user）
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerIdentity {
    pub host: String,
    pub port: u16,
    pub user: String,
}

impl ServerIdentity {
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
        }
    }

    /// 用于提示框显示的地址，默认端口时省略端口
    pub fn display_host(&self) -> String {
        if self.port == 0 || self.port == 21 || self.port == 22 {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// 密码缓存键
/// 四个字段完全相等才视为同一条目，不做任何规范化
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub challenge: String,
}

impl IdentityKey {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        challenge: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            challenge: challenge.into(),
        }
    }

    /// 由服务器身份和 challenge 构造
    pub fn for_server(server: &ServerIdentity, challenge: &str) -> Self {
        Self {
            host: server.host.clone(),
            port: server.port,
            user: server.user.clone(),
            challenge: challenge.to_string(),
        }
    }
}

/// 登录凭据
#[derive(Clone, Default)]
pub struct Credentials {
    pub logon_type: LogonType,
    password: Zeroizing<String>,
    /// 使用主密码公钥加密后的密码，解密前 password 为空
    pub encrypted: Option<EncryptedPassword>,
}

impl Credentials {
    pub fn new(logon_type: LogonType) -> Self {
        Self {
            logon_type,
            ..Default::default()
        }
    }

    pub fn with_password(logon_type: LogonType, password: impl Into<String>) -> Self {
        Self {
            logon_type,
            password: Zeroizing::new(password.into()),
            encrypted: None,
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = Zeroizing::new(password.into());
    }

    /// 加密凭据对应的主密码公钥
    pub fn encrypted_for(&self) -> Option<&PublicKey> {
        self.encrypted.as_ref().map(|e| e.recipient())
    }

    /// 用主密码公钥加密当前密码，并清空明文
    pub fn protect(&mut self, key: &PublicKey) -> Result<(), SecurityError> {
        let encrypted = EncryptedPassword::encrypt(&self.password, key)?;
        self.encrypted = Some(encrypted);
        self.password = Zeroizing::new(String::new());
        Ok(())
    }

    /// 用私钥解密密码；成功后凭据变为明文形式
    pub fn unprotect(&mut self, key: &PrivateKey) -> Result<(), SecurityError> {
        let Some(encrypted) = &self.encrypted else {
            return Ok(());
        };
        let password = encrypted.decrypt(key)?;
        self.password = password;
        self.encrypted = None;
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("logon_type", &self.logon_type)
            .field("password", &"<redacted>")
            .field("encrypted", &self.encrypted.is_some())
            .finish()
    }
}

/// 连接流程使用的站点：服务器身份 + 凭据
#[derive(Clone, Debug, Default)]
pub struct Site {
    pub server: ServerIdentity,
    pub credentials: Credentials,
}

impl Site {
    pub fn new(server: ServerIdentity, credentials: Credentials) -> Self {
        Self {
            server,
            credentials,
        }
    }

    /// 服务器未指定用户名，且登录方式需要询问
    pub fn needs_user(&self) -> bool {
        self.server.user.is_empty()
            && matches!(
                self.credentials.logon_type,
                LogonType::Ask | LogonType::Interactive
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_key_is_exact() {
        let a = IdentityKey::new("ftp.example.com", 21, "bob", "");
        let b = IdentityKey::new("FTP.example.com", 21, "bob", "");
        let c = IdentityKey::new("ftp.example.com", 21, "bob", " ");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, IdentityKey::for_server(&ServerIdentity::new("ftp.example.com", 21, "bob"), ""));
    }

    #[test]
    fn test_needs_user() {
        let mut site = Site::new(
            ServerIdentity::new("example.com", 21, ""),
            Credentials::new(LogonType::Ask),
        );
        assert!(site.needs_user());

        site.credentials.logon_type = LogonType::Normal;
        assert!(!site.needs_user());

        site.credentials.logon_type = LogonType::Interactive;
        site.server.user = "alice".to_string();
        assert!(!site.needs_user());
    }

    #[test]
    fn test_display_host() {
        assert_eq!(ServerIdentity::new("example.com", 22, "").display_host(), "example.com");
        assert_eq!(
            ServerIdentity::new("example.com", 2222, "").display_host(),
            "example.com:2222"
        );
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials::with_password(LogonType::Normal, "hunter2");
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
