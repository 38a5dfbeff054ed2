// 安全上下文
//
// 进程启动时创建一次，显式传给连接流程使用。持有密码缓存、解密器缓存和证书信任存储，
// 缓存未命中时通过 PromptCollaborator 询问用户。

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::cert_store::{CertificateTrustStore, TrustQuery};
use super::config::SecurityConfig;
use super::credential_cache::CredentialCache;
use super::crypto::{PrivateKey, PublicKey};
use super::decryptor_cache::{Decryptor, DecryptorCache, Resolution};
use super::error::InputRejection;
use super::in_flight::InFlight;
use super::prompt::{
    MasterPasswordAnswer, MasterPasswordPrompt, PasswordAnswer, PasswordPrompt,
    PromptCollaborator,
};
use crate::models::{IdentityKey, LogonType, ServerIdentity, Site};
use crate::services::storage::TrustPersistence;

/// get_password 参数
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PasswordRequest {
    /// 站点名称（显示用）
    pub name: String,
    /// 服务器下发的 challenge，为空表示首次登录
    pub challenge: String,
    /// 是否允许缓存本次输入
    pub can_remember: bool,
}

impl Default for PasswordRequest {
    fn default() -> Self {
        Self {
            name: String::new(),
            challenge: String::new(),
            can_remember: true,
        }
    }
}

impl PasswordRequest {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn challenge(challenge: impl Into<String>, can_remember: bool) -> Self {
        Self {
            challenge: challenge.into(),
            can_remember,
            ..Default::default()
        }
    }
}

/// 安全上下文
pub struct SecurityContext {
    config: SecurityConfig,
    prompt: Arc<dyn PromptCollaborator>,
    passwords: CredentialCache,
    decryptors: DecryptorCache,
    trust: CertificateTrustStore,
    pending_passwords: InFlight<IdentityKey>,
}

impl SecurityContext {
    /// 创建上下文，并从持久化存储加载信任记录
    pub fn new(
        config: SecurityConfig,
        prompt: Arc<dyn PromptCollaborator>,
        persistence: Arc<dyn TrustPersistence>,
    ) -> Self {
        let trust = CertificateTrustStore::load(persistence, &config);
        Self {
            config,
            prompt,
            passwords: CredentialCache::new(),
            decryptors: DecryptorCache::new(),
            trust,
            pending_passwords: InFlight::new(),
        }
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    pub fn credential_cache(&self) -> &CredentialCache {
        &self.passwords
    }

    pub fn decryptor_cache(&self) -> &DecryptorCache {
        &self.decryptors
    }

    pub fn trust_store(&self) -> &CertificateTrustStore {
        &self.trust
    }

    // ======================== 密码 ========================

    /// 为站点准备密码
    ///
    /// 返回 true 表示站点凭据已可用于登录。silent 模式只查询缓存，从不提示。
    pub fn get_password(&self, site: &mut Site, silent: bool, request: &PasswordRequest) -> bool {
        if !request.challenge.is_empty() {
            return self.get_challenge_password(site, silent, request);
        }

        let needs_user = site.needs_user();
        let logon_type = site.credentials.logon_type;
        if logon_type != LogonType::Ask && site.credentials.encrypted.is_none() && !needs_user {
            return true;
        }

        if let Some(recipient) = site.credentials.encrypted_for().copied() {
            if let Some(Decryptor::Key(key)) = self.decryptors.get(&recipient) {
                return match site.credentials.unprotect(&key) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(
                            "[LoginManager] Cached key {} failed to decrypt password for {}: {}",
                            recipient.key_identifier(),
                            site.server.host,
                            e
                        );
                        false
                    }
                };
            }

            if silent {
                return false;
            }
            return self.prompt_for_encrypted(site, &recipient, &request.name);
        }

        let key = IdentityKey::for_server(&site.server, "");
        if self.use_cached_password(site, &key) {
            return true;
        }
        if silent {
            return false;
        }
        self.prompt_for_password(site, &key, &request.name, "", request.can_remember)
    }

    fn get_challenge_password(&self, site: &mut Site, silent: bool, request: &PasswordRequest) -> bool {
        let key = IdentityKey::for_server(&site.server, &request.challenge);
        if request.can_remember && self.use_cached_password(site, &key) {
            return true;
        }
        if silent {
            return false;
        }
        self.prompt_for_password(
            site,
            &key,
            &request.name,
            &request.challenge,
            request.can_remember,
        )
    }

    fn use_cached_password(&self, site: &mut Site, key: &IdentityKey) -> bool {
        match self.passwords.get(key) {
            Some(password) => {
                debug!(
                    "[LoginManager] Using cached password for {}@{}:{}",
                    key.user, key.host, key.port
                );
                site.credentials.set_password(password.as_str());
                true
            }
            None => false,
        }
    }

    /// 服务器拒绝了缓存的密码
    pub fn cached_password_failed(&self, server: &ServerIdentity, challenge: &str) {
        self.passwords
            .forget(&IdentityKey::for_server(server, challenge));
    }

    /// 记住站点当前的密码（匿名登录无操作）
    pub fn remember_password(&self, site: &Site, challenge: &str) {
        self.passwords.remember(
            IdentityKey::for_server(&site.server, challenge),
            site.credentials.password(),
            site.credentials.logon_type,
        );
    }

    fn prompt_for_password(
        &self,
        site: &mut Site,
        key: &IdentityKey,
        name: &str,
        challenge: &str,
        can_remember: bool,
    ) -> bool {
        // 已知用户名时，同一身份只允许一个提示框；等待方在提示结束后重新查缓存
        let _guard = if site.server.user.is_empty() {
            None
        } else {
            let mut cached = None;
            let guard = self.pending_passwords.acquire(key, || {
                if can_remember {
                    cached = self.passwords.get(key);
                }
                cached.is_some()
            });
            if let Some(password) = cached {
                site.credentials.set_password(password.as_str());
                return true;
            }
            guard
        };

        let ask_user = site.server.user.is_empty();
        let username_only = ask_user && site.credentials.logon_type == LogonType::Interactive;
        let can_remember = can_remember && !username_only;

        let request = PasswordPrompt {
            host: site.server.display_host(),
            user: site.server.user.clone(),
            name: name.to_string(),
            challenge: challenge.to_string(),
            ask_user,
            ask_password: !username_only,
            can_remember,
        };

        loop {
            let answer = match self.prompt.prompt_password(&request) {
                Ok(answer) => answer,
                Err(e) => {
                    warn!(
                        "[LoginManager] Cannot ask for password for {}: {}",
                        request.host, e
                    );
                    return false;
                }
            };

            let (user, password, remember) = match answer {
                PasswordAnswer::Cancelled => {
                    debug!("[LoginManager] Password prompt for {} cancelled", request.host);
                    return false;
                }
                PasswordAnswer::Submitted {
                    user,
                    password,
                    remember,
                } => (user, password, remember),
            };

            if ask_user {
                match user.filter(|u| !u.is_empty()) {
                    Some(user) => site.server.user = user,
                    None => {
                        self.prompt.notify(InputRejection::NoUsernameProvided);
                        continue;
                    }
                }
            }

            site.credentials.set_password(password);

            if can_remember && remember {
                self.remember_password(site, challenge);
            }
            return true;
        }
    }

    fn prompt_for_encrypted(&self, site: &mut Site, recipient: &PublicKey, name: &str) -> bool {
        let request = MasterPasswordPrompt {
            key_identifier: recipient.key_identifier(),
            name: name.to_string(),
            host: site.server.display_host(),
            allow_forgotten: false,
            allow_cancel: true,
            allow_remember: true,
        };

        loop {
            let answer = match self.prompt.prompt_master_password(&request) {
                Ok(answer) => answer,
                Err(e) => {
                    warn!(
                        "[LoginManager] Cannot ask for master password for {}: {}",
                        request.host, e
                    );
                    return false;
                }
            };

            let (password, remember) = match answer {
                MasterPasswordAnswer::Password { password, remember } => (password, remember),
                MasterPasswordAnswer::Cancelled => return false,
                MasterPasswordAnswer::Forgotten => {
                    debug!("[LoginManager] Forgotten selection not offered here, asking again");
                    continue;
                }
            };

            if password.is_empty() {
                self.prompt.notify(InputRejection::NoSecretProvided);
                continue;
            }

            let key = PrivateKey::from_password(&password, recipient.salt(), &self.config.kdf);
            if key.public_key() != *recipient {
                self.prompt.notify(InputRejection::WrongMasterPassword);
                continue;
            }

            if let Err(e) = site.credentials.unprotect(&key) {
                warn!(
                    "[LoginManager] Master password matched but decryption failed for {}: {}",
                    request.host, e
                );
                self.prompt.notify(InputRejection::DecryptionFailed);
                continue;
            }

            if remember {
                self.decryptors.remember(key);
            }
            info!("[LoginManager] Unlocked stored password for {}", request.host);
            return true;
        }
    }

    // ======================== 解密器 ========================

    pub fn has_decryptor(&self, key: &PublicKey) -> bool {
        self.decryptors.has(key)
    }

    pub fn resolve_decryptor(
        &self,
        key: &PublicKey,
        allow_forgotten: bool,
        allow_cancel: bool,
    ) -> Resolution {
        self.decryptors.resolve(
            key,
            allow_forgotten,
            allow_cancel,
            self.prompt.as_ref(),
            &self.config.kdf,
        )
    }

    /// 已缓存的私钥；未缓存或已标记忘记时为 None
    pub fn get_decryptor(&self, key: &PublicKey) -> Option<PrivateKey> {
        self.decryptors
            .get(key)
            .and_then(|decryptor| decryptor.key().cloned())
    }

    pub fn remember_decryptor(&self, key: PrivateKey) {
        self.decryptors.remember(key);
    }

    // ======================== 证书信任 ========================

    pub fn is_trusted(&self, host: &str, port: u16, data: &[u8]) -> bool {
        self.trust.is_trusted(host, port, data)
    }

    pub fn is_trusted_with(&self, host: &str, port: u16, data: &[u8], query: TrustQuery) -> bool {
        self.trust.is_trusted_with(host, port, data, query)
    }

    pub fn set_trusted(
        &self,
        host: &str,
        port: u16,
        data: &[u8],
        permanent: bool,
        trust_all_hostnames: bool,
    ) {
        self.trust
            .set_trusted(host, port, data, permanent, trust_all_hostnames);
    }

    pub fn is_insecure(&self, host: &str, port: u16, permanent_only: bool) -> bool {
        self.trust.is_insecure(host, port, permanent_only)
    }

    pub fn set_insecure(&self, host: &str, port: u16, permanent: bool) {
        self.trust.set_insecure(host, port, permanent);
    }

    pub fn has_certificate(&self, host: &str, port: u16) -> bool {
        self.trust.has_certificate(host, port)
    }
}

impl Drop for SecurityContext {
    fn drop(&mut self) {
        self.passwords.clear();
        self.decryptors.clear();
    }
}
