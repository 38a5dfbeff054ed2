// ShellMaster 信任记录查看工具
// 列出永久信任的证书和永久放行的不安全主机

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;

use shellmaster_trust::security::CertificateTrustStore;
use shellmaster_trust::services::storage::{self, JsonTrustStorage};

fn main() -> Result<()> {
    // 初始化日志系统
    // 可以通过 RUST_LOG 环境变量控制日志级别，例如：RUST_LOG=debug cargo run
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false) // 不显示 target（模块路径）
        .init();

    let config = storage::load_security_config().context("无法加载安全配置")?;
    let persistence = JsonTrustStorage::from_config(&config)?;
    tracing::info!("[Trust] Reading trust records from {:?}", persistence.path());

    let store = CertificateTrustStore::load(Arc::new(persistence), &config);
    let now = Utc::now();

    let certificates = store.persistent_certificates();
    println!("Trusted certificates ({}):", certificates.len());
    for record in &certificates {
        let expires = match record.expires_at {
            Some(at) if record.is_expired(now) => format!("expired {}", at.format("%Y-%m-%d")),
            Some(at) => format!("expires {}", at.format("%Y-%m-%d")),
            None => "no expiry".to_string(),
        };
        println!(
            "  {}:{}  trusted {}  {}{}",
            record.host,
            record.port,
            record.trusted_at.format("%Y-%m-%d %H:%M"),
            expires,
            if record.trust_sans { "  (all hostnames)" } else { "" }
        );
    }

    let insecure = store.persistent_insecure_hosts();
    println!("Insecure hosts ({}):", insecure.len());
    for host in &insecure {
        println!("  {}:{}", host.host, host.port);
    }

    Ok(())
}
