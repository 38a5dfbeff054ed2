// 主密码密钥派生与凭据加密
//
// 主密码经 PBKDF2-HMAC-SHA256 派生为 X25519 私钥，公钥（附带盐值）随加密凭据保存，
// 用于在不保存主密码的前提下校验用户输入是否正确。

use std::fmt;

use base64::prelude::{Engine, BASE64_STANDARD};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use super::config::KdfConfig;
use super::error::SecurityError;

pub const KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// 主密码公钥
/// 同时作为解密器缓存的指纹：公钥与盐值逐字节相等才视为同一把钥匙
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey {
    key: [u8; KEY_LEN],
    salt: [u8; SALT_LEN],
}

impl PublicKey {
    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    pub fn key_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    /// base64(key || salt)
    pub fn to_base64(&self) -> String {
        let mut raw = [0u8; KEY_LEN + SALT_LEN];
        raw[..KEY_LEN].copy_from_slice(&self.key);
        raw[KEY_LEN..].copy_from_slice(&self.salt);
        BASE64_STANDARD.encode(raw)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, SecurityError> {
        let raw = BASE64_STANDARD.decode(encoded.trim())?;
        if raw.len() != KEY_LEN + SALT_LEN {
            return Err(SecurityError::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_LEN + SALT_LEN,
                raw.len()
            )));
        }
        let mut key = [0u8; KEY_LEN];
        let mut salt = [0u8; SALT_LEN];
        key.copy_from_slice(&raw[..KEY_LEN]);
        salt.copy_from_slice(&raw[KEY_LEN..]);
        Ok(Self { key, salt })
    }

    /// 提示框中显示的短标识
    pub fn key_identifier(&self) -> String {
        self.to_base64().chars().take(8).collect()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.key_identifier())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        PublicKey::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

/// 由主密码派生的私钥
#[derive(Clone)]
pub struct PrivateKey {
    secret: StaticSecret,
    salt: [u8; SALT_LEN],
}

impl PrivateKey {
    /// 使用给定盐值从主密码派生私钥
    pub fn from_password(password: &str, salt: &[u8; SALT_LEN], kdf: &KdfConfig) -> Self {
        let mut derived = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, kdf.iterations, &mut *derived);
        Self {
            secret: StaticSecret::from(*derived),
            salt: *salt,
        }
    }

    /// 生成新盐值并派生私钥（设置新主密码时使用）
    /// 主密码不能为空：解锁提示会拒绝空输入，空主密码生成的钥匙永远无法解锁
    pub fn generate_from_password(password: &str, kdf: &KdfConfig) -> Result<Self, SecurityError> {
        if password.is_empty() {
            return Err(SecurityError::InvalidKey("master password is empty".to_string()));
        }
        let salt = rand::random::<[u8; SALT_LEN]>();
        Ok(Self::from_password(password, &salt, kdf))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key: X25519PublicKey::from(&self.secret).to_bytes(),
            salt: self.salt,
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey(<redacted> for {})", self.public_key().key_identifier())
    }
}

/// 加密后的服务器密码
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPassword {
    recipient: PublicKey,
    ephemeral: [u8; KEY_LEN],
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl EncryptedPassword {
    /// 使用临时 X25519 密钥与接收方公钥协商，再以 ChaCha20-Poly1305 加密
    pub fn encrypt(plaintext: &str, recipient: &PublicKey) -> Result<Self, SecurityError> {
        let ephemeral = StaticSecret::from(rand::random::<[u8; KEY_LEN]>());
        let ephemeral_public = X25519PublicKey::from(&ephemeral).to_bytes();
        let shared = ephemeral.diffie_hellman(&X25519PublicKey::from(recipient.key));

        let key = derive_cipher_key(shared.as_bytes(), &ephemeral_public, &recipient.key);
        let cipher = ChaCha20Poly1305::new_from_slice(&*key)
            .map_err(|e| SecurityError::Encrypt(e.to_string()))?;

        let nonce = rand::random::<[u8; NONCE_LEN]>();
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| SecurityError::Encrypt(e.to_string()))?;

        Ok(Self {
            recipient: *recipient,
            ephemeral: ephemeral_public,
            nonce,
            ciphertext,
        })
    }

    /// 可解密此密码的主密码公钥
    pub fn recipient(&self) -> &PublicKey {
        &self.recipient
    }

    pub fn decrypt(&self, key: &PrivateKey) -> Result<Zeroizing<String>, SecurityError> {
        if key.public_key() != self.recipient {
            return Err(SecurityError::Decrypt(format!(
                "key {} cannot decrypt data for {}",
                key.public_key().key_identifier(),
                self.recipient.key_identifier()
            )));
        }

        let shared = key
            .secret
            .diffie_hellman(&X25519PublicKey::from(self.ephemeral));
        let cipher_key = derive_cipher_key(shared.as_bytes(), &self.ephemeral, &self.recipient.key);
        let cipher = ChaCha20Poly1305::new_from_slice(&*cipher_key)
            .map_err(|e| SecurityError::Decrypt(e.to_string()))?;

        let plaintext = Zeroizing::new(
            cipher.decrypt(Nonce::from_slice(&self.nonce), self.ciphertext.as_slice())?,
        );
        let password = std::str::from_utf8(&plaintext)
            .map_err(|e| SecurityError::Decrypt(e.to_string()))?;
        Ok(Zeroizing::new(password.to_string()))
    }
}

fn derive_cipher_key(
    shared: &[u8; KEY_LEN],
    ephemeral: &[u8; KEY_LEN],
    recipient: &[u8; KEY_LEN],
) -> Zeroizing<[u8; KEY_LEN]> {
    let mut hasher = Sha256::new();
    hasher.update(shared);
    hasher.update(ephemeral);
    hasher.update(recipient);
    let digest = hasher.finalize();

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    key.copy_from_slice(&digest);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_kdf() -> KdfConfig {
        KdfConfig { iterations: 16 }
    }

    #[test]
    fn test_from_password_is_deterministic() {
        let salt = [7u8; SALT_LEN];
        let a = PrivateKey::from_password("right", &salt, &fast_kdf());
        let b = PrivateKey::from_password("right", &salt, &fast_kdf());
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.public_key().salt(), &salt);
    }

    #[test]
    fn test_wrong_password_gives_other_key() {
        let salt = [7u8; SALT_LEN];
        let right = PrivateKey::from_password("right", &salt, &fast_kdf());
        let wrong = PrivateKey::from_password("wrong", &salt, &fast_kdf());
        assert_ne!(right.public_key(), wrong.public_key());
    }

    #[test]
    fn test_same_password_other_salt_gives_other_key() {
        let a = PrivateKey::from_password("right", &[1u8; SALT_LEN], &fast_kdf());
        let b = PrivateKey::from_password("right", &[2u8; SALT_LEN], &fast_kdf());
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_empty_master_password_is_refused() {
        assert!(matches!(
            PrivateKey::generate_from_password("", &fast_kdf()),
            Err(SecurityError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_public_key_base64() {
        let key = PrivateKey::generate_from_password("pw", &fast_kdf()).unwrap().public_key();
        let encoded = key.to_base64();
        assert_eq!(PublicKey::from_base64(&encoded).unwrap(), key);
        assert_eq!(key.key_identifier().len(), 8);
        assert!(encoded.starts_with(&key.key_identifier()));

        assert!(matches!(
            PublicKey::from_base64("AAAA"),
            Err(SecurityError::InvalidKey(_))
        ));
        assert!(PublicKey::from_base64("not base64!").is_err());
    }

    #[test]
    fn test_encrypted_password_requires_matching_key() {
        let key = PrivateKey::generate_from_password("master", &fast_kdf()).unwrap();
        let other = PrivateKey::generate_from_password("master", &fast_kdf()).unwrap();

        let encrypted = EncryptedPassword::encrypt("s3cr3t", &key.public_key()).unwrap();
        assert_eq!(encrypted.recipient(), &key.public_key());
        assert_eq!(encrypted.decrypt(&key).unwrap().as_str(), "s3cr3t");
        assert!(matches!(
            encrypted.decrypt(&other),
            Err(SecurityError::Decrypt(_))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_is_rejected() {
        let key = PrivateKey::generate_from_password("master", &fast_kdf()).unwrap();
        let mut encrypted = EncryptedPassword::encrypt("s3cr3t", &key.public_key()).unwrap();
        encrypted.ciphertext[0] ^= 0x01;
        assert!(encrypted.decrypt(&key).is_err());
    }

    #[test]
    fn test_debug_does_not_leak_secret() {
        let key = PrivateKey::generate_from_password("master", &fast_kdf()).unwrap();
        let text = format!("{:?}", key);
        assert!(text.contains("<redacted>"));
        assert!(text.contains(&key.public_key().key_identifier()));
    }
}
