// 安全模块
//
// 模块结构:
// - context: 安全上下文，连接流程的唯一入口 (SecurityContext)
// - credential_cache: 会话密码缓存 (CredentialCache)
// - decryptor_cache: 主密码私钥缓存 (DecryptorCache)
// - cert_store: 证书信任与不安全连接放行 (CertificateTrustStore)
// - prompt: 提示框协作接口与 UI 通道桥接 (PromptCollaborator, ChannelPrompt)
// - crypto: 主密码派生与密码加密 (PublicKey, PrivateKey, EncryptedPassword)
// - certificate: 证书 SAN / 有效期解析
// - config: 安全配置 (SecurityConfig)
// - error: 错误类型 (SecurityError, InputRejection)

pub mod cert_store;
pub mod certificate;
pub mod config;
pub mod context;
pub mod credential_cache;
pub mod crypto;
pub mod decryptor_cache;
pub mod error;
pub mod in_flight;
pub mod prompt;

#[cfg(test)]
pub mod test_support;

// 公开导出
pub use cert_store::{CertificateTrustStore, TrustQuery};
pub use config::{KdfConfig, SecurityConfig};
pub use context::{PasswordRequest, SecurityContext};
pub use credential_cache::CredentialCache;
pub use crypto::{EncryptedPassword, PrivateKey, PublicKey};
pub use decryptor_cache::{Decryptor, DecryptorCache, Resolution};
pub use error::{InputRejection, SecurityError};
pub use prompt::{
    ChannelPrompt, MasterPasswordAnswer, MasterPasswordPrompt, PasswordAnswer, PasswordPrompt,
    PromptCollaborator, PromptRequest,
};
