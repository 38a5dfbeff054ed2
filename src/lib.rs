// ShellMaster 凭据缓存与证书信任存储
//
// 连接流程通过 SecurityContext 获取密码、解锁加密凭据、判断证书是否可信。

pub mod models;
pub mod security;
pub mod services;

pub use models::{Credentials, IdentityKey, LogonType, ServerIdentity, Site};
pub use security::{
    CertificateTrustStore, PasswordRequest, PromptCollaborator, SecurityConfig, SecurityContext,
};
pub use services::{JsonTrustStorage, TrustPersistence};
