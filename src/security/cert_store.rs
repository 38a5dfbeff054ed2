// 证书信任存储
//
// 两层存储：永久记录（持久化，重启后仍有效）和会话记录（进程结束即失效）。
// 会话层的决定永远不会写入持久化存储。

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::certificate;
use super::config::SecurityConfig;
use crate::models::{CertificateRecord, InsecureHost};
use crate::services::storage::TrustPersistence;

/// is_trusted_with 查询选项
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrustQuery {
    /// 仅查询永久记录
    pub permanent_only: bool,
    /// 允许按 SAN 集合匹配（主机名不匹配时调用方应关闭）
    pub allow_sans: bool,
}

impl Default for TrustQuery {
    fn default() -> Self {
        Self {
            permanent_only: false,
            allow_sans: true,
        }
    }
}

#[derive(Default)]
struct TrustState {
    persistent_certs: Vec<CertificateRecord>,
    session_certs: Vec<CertificateRecord>,
    persistent_insecure: HashSet<InsecureHost>,
    session_insecure: HashSet<InsecureHost>,
}

/// 证书与不安全主机信任存储
pub struct CertificateTrustStore {
    state: RwLock<TrustState>,
    persistence: Arc<dyn TrustPersistence>,
}

impl CertificateTrustStore {
    /// 从持久化存储加载
    /// 加载失败时以空存储启动（之后会重新询问用户）
    pub fn load(persistence: Arc<dyn TrustPersistence>, config: &SecurityConfig) -> Self {
        let mut state = TrustState::default();

        match persistence.load_trust_records() {
            Ok(records) => {
                let now = Utc::now();
                for record in records.certificates {
                    if config.drop_expired_certificates && record.is_expired(now) {
                        info!(
                            "[CertStore] Dropping expired certificate for {}:{}",
                            record.host, record.port
                        );
                        continue;
                    }
                    state.persistent_certs.push(record);
                }
                state.persistent_insecure.extend(records.insecure_hosts);
                debug!(
                    "[CertStore] Loaded {} trusted certificates, {} insecure hosts",
                    state.persistent_certs.len(),
                    state.persistent_insecure.len()
                );
            }
            Err(e) => {
                warn!(
                    "[CertStore] Failed to load trust records, starting empty: {:#}",
                    e
                );
            }
        }

        Self {
            state: RwLock::new(state),
            persistence,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, TrustState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TrustState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// 证书是否已被信任（会话记录优先，其次永久记录）
    pub fn is_trusted(&self, host: &str, port: u16, data: &[u8]) -> bool {
        self.is_trusted_with(host, port, data, TrustQuery::default())
    }

    /// 空证书数据（握手未提供证书）永远不可信
    pub fn is_trusted_with(&self, host: &str, port: u16, data: &[u8], query: TrustQuery) -> bool {
        if data.is_empty() {
            return false;
        }
        let state = self.read();

        let matches = |record: &CertificateRecord| {
            if !record.is_for(host, port) {
                return false;
            }
            if record.data == data {
                return true;
            }
            query.allow_sans && record.trust_sans && certificate::same_alt_names(&record.data, data)
        };

        if !query.permanent_only && state.session_certs.iter().any(|r| matches(r)) {
            return true;
        }
        state.persistent_certs.iter().any(|r| matches(r))
    }

    /// 信任证书
    /// 不去重：同一 host/port 可以随证书更换积累多条记录
    pub fn set_trusted(
        &self,
        host: &str,
        port: u16,
        data: &[u8],
        permanent: bool,
        trust_all_hostnames: bool,
    ) {
        let expires_at = match certificate::expiration(data) {
            Ok(expires_at) => Some(expires_at),
            Err(e) => {
                debug!("[CertStore] Cannot read expiration for {}:{}: {}", host, port, e);
                None
            }
        };

        let record = CertificateRecord {
            host: host.to_string(),
            port,
            trust_sans: trust_all_hostnames,
            data: data.to_vec(),
            trusted_at: Utc::now(),
            expires_at,
        };

        info!(
            "[CertStore] Trusting certificate for {}:{} (permanent: {}, trust SANs: {})",
            host, port, permanent, trust_all_hostnames
        );

        if !permanent {
            self.write().session_certs.push(record);
            return;
        }

        self.write().persistent_certs.push(record.clone());
        if let Err(e) = self.persistence.append_certificate(&record) {
            warn!(
                "[CertStore] Failed to persist certificate for {}:{}: {:#}",
                host, port, e
            );
        }
    }

    /// 接受不安全连接
    pub fn set_insecure(&self, host: &str, port: u16, permanent: bool) {
        let entry = InsecureHost::new(host, port);
        info!(
            "[CertStore] Accepting insecure connection to {}:{} (permanent: {})",
            host, port, permanent
        );

        if !permanent {
            self.write().session_insecure.insert(entry);
            return;
        }

        let inserted = self.write().persistent_insecure.insert(entry.clone());
        if inserted {
            if let Err(e) = self.persistence.append_insecure_host(&entry) {
                warn!(
                    "[CertStore] Failed to persist insecure host {}:{}: {:#}",
                    host, port, e
                );
            }
        }
    }

    pub fn is_insecure(&self, host: &str, port: u16, permanent_only: bool) -> bool {
        let entry = InsecureHost::new(host, port);
        let state = self.read();
        if state.persistent_insecure.contains(&entry) {
            return true;
        }
        !permanent_only && state.session_insecure.contains(&entry)
    }

    /// 是否见过此地址的任何证书（区分"从未连接"和"证书已变化"）
    pub fn has_certificate(&self, host: &str, port: u16) -> bool {
        let state = self.read();
        state
            .session_certs
            .iter()
            .chain(state.persistent_certs.iter())
            .any(|record| record.is_for(host, port))
    }

    /// 永久信任的证书
    pub fn persistent_certificates(&self) -> Vec<CertificateRecord> {
        self.read().persistent_certs.clone()
    }

    /// 永久接受的不安全主机（已排序）
    pub fn persistent_insecure_hosts(&self) -> Vec<InsecureHost> {
        let mut hosts: Vec<_> = self.read().persistent_insecure.iter().cloned().collect();
        hosts.sort();
        hosts
    }
}
