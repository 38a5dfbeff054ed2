// 本地数据持久化服务

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::{debug, info};

use crate::models::{CertificateRecord, InsecureHost, TrustRecords};
use crate::security::config::SecurityConfig;

/// 获取配置目录路径
/// macOS: ~/Library/Application Support/shellmaster
/// Linux: ~/.config/shellmaster
/// Windows: C:\Users\<用户名>\AppData\Roaming\shellmaster
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("无法获取系统配置目录")?
        .join("shellmaster");
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir).context("无法创建配置目录")?;
    }
    Ok(config_dir)
}

// ======================== 安全配置 ========================

/// 获取安全配置文件路径
pub fn get_security_config_file() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("security.json"))
}

/// 加载安全配置，文件不存在时返回默认配置
pub fn load_security_config() -> Result<SecurityConfig> {
    load_security_config_from(&get_security_config_file()?)
}

pub fn load_security_config_from(path: &Path) -> Result<SecurityConfig> {
    if !path.exists() {
        return Ok(SecurityConfig::default());
    }
    let content = fs::read_to_string(path).context("无法读取安全配置文件")?;
    let config: SecurityConfig = serde_json::from_str(&content).context("无法解析安全配置文件")?;
    Ok(config)
}

// ======================== 信任记录持久化 ========================

/// 信任记录持久化接口
/// 永久记录只增不减，不需要更新/删除
pub trait TrustPersistence: Send + Sync {
    /// 启动时加载全部记录
    fn load_trust_records(&self) -> Result<TrustRecords>;

    /// 追加一条永久信任的证书
    fn append_certificate(&self, record: &CertificateRecord) -> Result<()>;

    /// 追加一个永久接受的不安全主机
    fn append_insecure_host(&self, host: &InsecureHost) -> Result<()>;
}

/// 获取信任记录文件默认路径
pub fn get_trusted_hosts_file() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("trusted_hosts.json"))
}

/// JSON 文件存储
pub struct JsonTrustStorage {
    path: PathBuf,
    /// 串行化 读取-修改-写入
    write_lock: Mutex<()>,
    /// 写入时清理已过期的证书
    prune_expired: bool,
}

impl JsonTrustStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            prune_expired: true,
        }
    }

    pub fn with_expired_pruning(mut self, prune_expired: bool) -> Self {
        self.prune_expired = prune_expired;
        self
    }

    /// 按配置选择文件路径，未配置时使用配置目录
    pub fn from_config(config: &SecurityConfig) -> Result<Self> {
        let path = match &config.trust_store_file {
            Some(path) => path.clone(),
            None => get_trusted_hosts_file()?,
        };
        Ok(Self::new(path).with_expired_pruning(config.drop_expired_certificates))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<TrustRecords> {
        if !self.path.exists() {
            return Ok(TrustRecords::default());
        }
        let content = fs::read_to_string(&self.path).context("无法读取信任记录文件")?;
        let records: TrustRecords =
            serde_json::from_str(&content).context("无法解析信任记录文件")?;
        Ok(records)
    }

    fn save(&self, records: &TrustRecords) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).context("无法创建信任记录目录")?;
            }
        }
        let content = serde_json::to_string_pretty(records).context("无法序列化信任记录")?;
        fs::write(&self.path, content).context("无法写入信任记录文件")?;
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut TrustRecords)) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut records = self.load()?;
        if self.prune_expired {
            let now = Utc::now();
            let before = records.certificates.len();
            records.certificates.retain(|record| !record.is_expired(now));
            let pruned = before - records.certificates.len();
            if pruned > 0 {
                info!("[Storage] Removed {} expired certificates from {:?}", pruned, self.path);
            }
        }
        apply(&mut records);
        self.save(&records)
    }
}

impl TrustPersistence for JsonTrustStorage {
    fn load_trust_records(&self) -> Result<TrustRecords> {
        debug!("[Storage] Loading trust records from {:?}", self.path);
        self.load()
    }

    fn append_certificate(&self, record: &CertificateRecord) -> Result<()> {
        self.update(|records| records.certificates.push(record.clone()))
    }

    fn append_insecure_host(&self, host: &InsecureHost) -> Result<()> {
        self.update(|records| {
            if !records.insecure_hosts.contains(host) {
                records.insecure_hosts.push(host.clone());
            }
        })
    }
}

/// 内存存储
/// 多个上下文共享同一实例即可模拟进程重启
#[derive(Default)]
pub struct MemoryTrustStorage {
    records: Mutex<TrustRecords>,
    fail: bool,
}

impl MemoryTrustStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: TrustRecords) -> Self {
        Self {
            records: Mutex::new(records),
            fail: false,
        }
    }

    /// 所有操作都失败的存储（模拟磁盘不可用）
    pub fn failing() -> Self {
        Self {
            records: Mutex::new(TrustRecords::default()),
            fail: true,
        }
    }

    /// 当前已持久化的记录
    pub fn snapshot(&self) -> TrustRecords {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check(&self) -> Result<()> {
        if self.fail {
            bail!("存储不可用");
        }
        Ok(())
    }
}

impl TrustPersistence for MemoryTrustStorage {
    fn load_trust_records(&self) -> Result<TrustRecords> {
        self.check()?;
        Ok(self.snapshot())
    }

    fn append_certificate(&self, record: &CertificateRecord) -> Result<()> {
        self.check()?;
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .certificates
            .push(record.clone());
        Ok(())
    }

    fn append_insecure_host(&self, host: &InsecureHost) -> Result<()> {
        self.check()?;
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if !records.insecure_hosts.contains(host) {
            records.insecure_hosts.push(host.clone());
        }
        Ok(())
    }
}
