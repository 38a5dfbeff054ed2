// 凭据与信任模块错误类型定义

use thiserror::Error;

/// 安全模块错误类型
#[derive(Debug, Error)]
pub enum SecurityError {
    /// 解密失败（密钥不匹配或数据被篡改）
    #[error("Decryption failed: {0}")]
    Decrypt(String),

    /// 加密失败
    #[error("Encryption failed: {0}")]
    Encrypt(String),

    /// 密钥格式错误
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// 提示框不可用（UI 已关闭）
    #[error("Prompt unavailable: {0}")]
    PromptUnavailable(String),

    /// 证书解析错误
    #[error("Certificate error: {0}")]
    Certificate(String),
}

/// 用户输入被拒绝的原因
/// 由提示循环在本地处理（提示用户后重新询问），不会向调用方传播
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum InputRejection {
    /// 主密码错误
    #[error("Wrong master password entered, it cannot be used to decrypt the stored passwords.")]
    WrongMasterPassword,

    /// 主密码正确但无法解密服务器密码
    #[error("Failed to decrypt server password.")]
    DecryptionFailed,

    /// 未输入用户名
    #[error("No username given.")]
    NoUsernameProvided,

    /// 未输入密码
    #[error("No password given.")]
    NoSecretProvided,
}

impl From<chacha20poly1305::aead::Error> for SecurityError {
    fn from(e: chacha20poly1305::aead::Error) -> Self {
        SecurityError::Decrypt(e.to_string())
    }
}

impl From<base64::DecodeError> for SecurityError {
    fn from(e: base64::DecodeError) -> Self {
        SecurityError::InvalidKey(e.to_string())
    }
}
