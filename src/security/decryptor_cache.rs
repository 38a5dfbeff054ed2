// 解密器缓存
// 缓存由主密码派生出的私钥，避免每次访问加密凭据都重新派生

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tracing::{debug, info, warn};

use super::config::KdfConfig;
use super::crypto::{PrivateKey, PublicKey};
use super::error::InputRejection;
use super::in_flight::InFlight;
use super::prompt::{MasterPasswordAnswer, MasterPasswordPrompt, PromptCollaborator};

/// 缓存条目
#[derive(Clone, Debug)]
pub enum Decryptor {
    /// 可用的私钥
    Key(PrivateKey),
    /// 用户表示忘记了主密码，本次会话不再询问
    Forgotten,
}

impl Decryptor {
    pub fn key(&self) -> Option<&PrivateKey> {
        match self {
            Decryptor::Key(key) => Some(key),
            Decryptor::Forgotten => None,
        }
    }
}

/// resolve 的结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// 已取得私钥
    Unlocked,
    /// 已标记为忘记（成功，但没有私钥）
    Forgotten,
    /// 用户取消，未缓存任何内容
    Cancelled,
}

impl Resolution {
    pub fn is_success(&self) -> bool {
        !matches!(self, Resolution::Cancelled)
    }
}

/// 解密器缓存 (PublicKey -> Decryptor)
#[derive(Default)]
pub struct DecryptorCache {
    entries: RwLock<HashMap<PublicKey, Decryptor>>,
    pending: InFlight<PublicKey>,
}

impl DecryptorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, key: &PublicKey) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn get(&self, key: &PublicKey) -> Option<Decryptor> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// 以私钥自身的公钥为键缓存
    pub fn remember(&self, key: PrivateKey) {
        let public = key.public_key();
        debug!("[Decryptors] Remembering key {}", public.key_identifier());
        self.insert(public, Decryptor::Key(key));
    }

    fn insert(&self, public: PublicKey, decryptor: Decryptor) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(public, decryptor);
    }

    fn resolution_of(&self, key: &PublicKey) -> Option<Resolution> {
        self.get(key).map(|decryptor| match decryptor {
            Decryptor::Key(_) => Resolution::Unlocked,
            Decryptor::Forgotten => Resolution::Forgotten,
        })
    }

    /// 取得 `target` 对应的私钥，必要时询问主密码
    ///
    /// 已有条目（包括"忘记"标记）直接返回。否则循环提示：
    /// 密码正确则缓存私钥；密码错误提示后重试且不修改缓存；
    /// 选择忘记则缓存标记；允许取消时取消返回 `Cancelled`。
    /// 提示期间不持有缓存锁；同一公钥的并发调用会等待第一个提示结束。
    pub fn resolve(
        &self,
        target: &PublicKey,
        allow_forgotten: bool,
        allow_cancel: bool,
        prompt: &dyn PromptCollaborator,
        kdf: &KdfConfig,
    ) -> Resolution {
        let mut hit = None;
        let Some(_guard) = self.pending.acquire(target, || {
            hit = self.resolution_of(target);
            hit.is_some()
        }) else {
            return hit.unwrap_or(Resolution::Cancelled);
        };

        let request = MasterPasswordPrompt {
            key_identifier: target.key_identifier(),
            allow_forgotten,
            allow_cancel,
            ..Default::default()
        };

        loop {
            let answer = match prompt.prompt_master_password(&request) {
                Ok(answer) => answer,
                Err(e) => {
                    warn!(
                        "[Decryptors] Cannot ask for master password of {}: {}",
                        request.key_identifier, e
                    );
                    return Resolution::Cancelled;
                }
            };

            match answer {
                MasterPasswordAnswer::Password { password, .. } => {
                    if password.is_empty() {
                        prompt.notify(InputRejection::NoSecretProvided);
                        continue;
                    }
                    let key = PrivateKey::from_password(&password, target.salt(), kdf);
                    if key.public_key() != *target {
                        debug!(
                            "[Decryptors] Wrong master password for {}",
                            request.key_identifier
                        );
                        prompt.notify(InputRejection::WrongMasterPassword);
                        continue;
                    }
                    info!("[Decryptors] Unlocked key {}", request.key_identifier);
                    self.insert(*target, Decryptor::Key(key));
                    return Resolution::Unlocked;
                }
                MasterPasswordAnswer::Forgotten if allow_forgotten => {
                    info!(
                        "[Decryptors] Master password for {} marked as forgotten",
                        request.key_identifier
                    );
                    self.insert(*target, Decryptor::Forgotten);
                    return Resolution::Forgotten;
                }
                MasterPasswordAnswer::Forgotten => {
                    debug!("[Decryptors] Ignoring forgotten selection, not offered");
                }
                MasterPasswordAnswer::Cancelled if allow_cancel => {
                    debug!(
                        "[Decryptors] Master password prompt for {} cancelled",
                        request.key_identifier
                    );
                    return Resolution::Cancelled;
                }
                MasterPasswordAnswer::Cancelled => {}
            }
        }
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::test_support::{fast_kdf, master_key, ScriptedPrompt};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn password(p: &str) -> MasterPasswordAnswer {
        MasterPasswordAnswer::Password {
            password: p.to_string(),
            remember: false,
        }
    }

    #[test]
    fn test_remember_uses_own_public_key() {
        let cache = DecryptorCache::new();
        let key = master_key("right");
        let public = key.public_key();
        cache.remember(key);
        assert!(cache.has(&public));
        assert_eq!(
            cache.get(&public).unwrap().key().unwrap().public_key(),
            public
        );
    }

    #[test]
    fn test_wrong_then_right_password() {
        let cache = DecryptorCache::new();
        let target = master_key("right").public_key();
        let prompt = ScriptedPrompt::new().master(vec![password("wrong"), password("right")]);

        let outcome = cache.resolve(&target, false, true, &prompt, &fast_kdf());
        assert_eq!(outcome, Resolution::Unlocked);
        assert_eq!(prompt.master_prompts(), 2);
        assert_eq!(prompt.notices(), vec![InputRejection::WrongMasterPassword]);

        let key = cache.get(&target).unwrap();
        assert_eq!(key.key().unwrap().public_key(), target);
    }

    #[test]
    fn test_cached_resolve_does_not_prompt() {
        let cache = DecryptorCache::new();
        let target = master_key("right").public_key();
        let prompt = ScriptedPrompt::new().master(vec![password("right")]);

        assert!(cache.resolve(&target, false, true, &prompt, &fast_kdf()).is_success());
        assert_eq!(cache.resolve(&target, false, true, &prompt, &fast_kdf()), Resolution::Unlocked);
        assert_eq!(prompt.master_prompts(), 1);
    }

    #[test]
    fn test_wrong_password_never_mutates() {
        let cache = DecryptorCache::new();
        let target = master_key("right").public_key();
        let prompt = ScriptedPrompt::new().master(vec![
            password("wrong"),
            password("also wrong"),
            MasterPasswordAnswer::Cancelled,
        ]);

        assert_eq!(
            cache.resolve(&target, true, true, &prompt, &fast_kdf()),
            Resolution::Cancelled
        );
        assert!(!cache.has(&target));
        assert!(cache.get(&target).is_none());
    }

    #[test]
    fn test_forgotten_suppresses_prompting() {
        let cache = DecryptorCache::new();
        let target = master_key("right").public_key();
        let prompt = ScriptedPrompt::new().master(vec![MasterPasswordAnswer::Forgotten]);

        assert_eq!(
            cache.resolve(&target, true, false, &prompt, &fast_kdf()),
            Resolution::Forgotten
        );
        assert!(matches!(cache.get(&target), Some(Decryptor::Forgotten)));

        assert_eq!(
            cache.resolve(&target, true, false, &prompt, &fast_kdf()),
            Resolution::Forgotten
        );
        assert_eq!(prompt.master_prompts(), 1);
    }

    #[test]
    fn test_disallowed_cancel_reprompts() {
        let cache = DecryptorCache::new();
        let target = master_key("right").public_key();
        let prompt = ScriptedPrompt::new().master(vec![
            MasterPasswordAnswer::Cancelled,
            MasterPasswordAnswer::Cancelled,
            password("right"),
        ]);

        assert_eq!(
            cache.resolve(&target, true, false, &prompt, &fast_kdf()),
            Resolution::Unlocked
        );
        assert_eq!(prompt.master_prompts(), 3);
    }

    #[test]
    fn test_forgotten_not_offered_is_ignored() {
        let cache = DecryptorCache::new();
        let target = master_key("right").public_key();
        let prompt = ScriptedPrompt::new().master(vec![
            MasterPasswordAnswer::Forgotten,
            MasterPasswordAnswer::Cancelled,
        ]);

        assert_eq!(
            cache.resolve(&target, false, true, &prompt, &fast_kdf()),
            Resolution::Cancelled
        );
        assert!(!cache.has(&target));
    }

    #[test]
    fn test_empty_password_is_rejected() {
        let cache = DecryptorCache::new();
        let target = master_key("right").public_key();
        let prompt = ScriptedPrompt::new().master(vec![password(""), password("right")]);

        assert_eq!(
            cache.resolve(&target, false, true, &prompt, &fast_kdf()),
            Resolution::Unlocked
        );
        assert_eq!(prompt.notices(), vec![InputRejection::NoSecretProvided]);
    }

    #[test]
    fn test_unavailable_prompt_ends_loop() {
        let cache = DecryptorCache::new();
        let target = master_key("right").public_key();
        // 脚本耗尽时返回 PromptUnavailable
        let prompt = ScriptedPrompt::new();

        assert_eq!(
            cache.resolve(&target, true, false, &prompt, &fast_kdf()),
            Resolution::Cancelled
        );
        assert!(!cache.has(&target));
    }

    #[test]
    fn test_concurrent_resolve_prompts_once() {
        let cache = Arc::new(DecryptorCache::new());
        let target = master_key("right").public_key();
        let prompt = Arc::new(
            ScriptedPrompt::new()
                .master(vec![password("right")])
                .with_delay(Duration::from_millis(100)),
        );

        let workers: Vec<_> = (0..3)
            .map(|_| {
                let cache = cache.clone();
                let prompt = prompt.clone();
                thread::spawn(move || cache.resolve(&target, false, true, &*prompt, &fast_kdf()))
            })
            .collect();

        for worker in workers {
            assert_eq!(worker.join().unwrap(), Resolution::Unlocked);
        }
        assert_eq!(prompt.master_prompts(), 1);
    }

    #[test]
    fn test_other_keys_readable_while_prompting() {
        let cache = Arc::new(DecryptorCache::new());
        let waiting = master_key("a").public_key();
        let cached = master_key("b");
        let cached_public = cached.public_key();
        cache.remember(cached);

        let delay = Duration::from_millis(300);
        let prompt = Arc::new(
            ScriptedPrompt::new()
                .master(vec![MasterPasswordAnswer::Cancelled])
                .with_delay(delay),
        );

        let prompting = {
            let cache = cache.clone();
            let prompt = prompt.clone();
            thread::spawn(move || cache.resolve(&waiting, false, true, &*prompt, &fast_kdf()))
        };

        // 等待第一个提示开始
        while !cache.pending.is_pending(&waiting) {
            thread::sleep(Duration::from_millis(5));
        }

        let started = Instant::now();
        assert!(cache.has(&cached_public));
        assert!(cache.get(&cached_public).unwrap().key().is_some());
        assert_eq!(
            cache.resolve(&cached_public, false, true, &*prompt, &fast_kdf()),
            Resolution::Unlocked
        );
        assert!(started.elapsed() < delay);

        assert_eq!(prompting.join().unwrap(), Resolution::Cancelled);
        assert!(!cache.has(&waiting));
        assert_eq!(
            cache.get(&cached_public).unwrap().key().unwrap().public_key(),
            cached_public
        );
        assert_eq!(prompt.master_prompts(), 1);
    }
}
