// 会话密码缓存
// 仅在进程生命周期内有效，从不持久化

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tracing::debug;
use zeroize::Zeroizing;

use crate::models::{IdentityKey, LogonType};

/// 会话密码缓存 (IdentityKey -> 密码)
#[derive(Default)]
pub struct CredentialCache {
    entries: RwLock<HashMap<IdentityKey, Zeroizing<String>>>,
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 查找缓存的密码
    pub fn get(&self, key: &IdentityKey) -> Option<Zeroizing<String>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// 记住密码，已存在时覆盖
    /// 匿名登录从不缓存密码
    pub fn remember(&self, key: IdentityKey, password: &str, logon_type: LogonType) {
        if logon_type == LogonType::Anonymous {
            debug!(
                "[LoginManager] Not caching password for anonymous logon to {}:{}",
                key.host, key.port
            );
            return;
        }

        debug!(
            "[LoginManager] Caching password for {}@{}:{}",
            key.user, key.host, key.port
        );
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Zeroizing::new(password.to_string()));
    }

    /// 移除缓存的密码（服务器拒绝了缓存的密码时调用）
    pub fn forget(&self, key: &IdentityKey) {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        if removed.is_some() {
            debug!(
                "[LoginManager] Dropped cached password for {}@{}:{}",
                key.user, key.host, key.port
            );
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
