// X.509 证书解析：SAN 集合与过期时间

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use x509_parser::prelude::*;

use super::error::SecurityError;

/// Subject Alternative Name 条目
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AltName {
    /// DNS 名称（小写）
    Dns(String),
    /// IP 地址原始字节
    Ip(Vec<u8>),
    Email(String),
    Uri(String),
}

fn parse(data: &[u8]) -> Result<X509Certificate<'_>, SecurityError> {
    let (_, cert) = X509Certificate::from_der(data)
        .map_err(|e| SecurityError::Certificate(e.to_string()))?;
    Ok(cert)
}

/// 提取证书的 SAN 集合（与顺序无关）
pub fn subject_alt_names(data: &[u8]) -> Result<BTreeSet<AltName>, SecurityError> {
    let cert = parse(data)?;
    let mut names = BTreeSet::new();

    let extension = cert
        .subject_alternative_name()
        .map_err(|e| SecurityError::Certificate(e.to_string()))?;
    let Some(extension) = extension else {
        return Ok(names);
    };

    for name in &extension.value.general_names {
        match name {
            GeneralName::DNSName(dns) => {
                names.insert(AltName::Dns(dns.to_ascii_lowercase()));
            }
            GeneralName::IPAddress(ip) => {
                names.insert(AltName::Ip(ip.to_vec()));
            }
            GeneralName::RFC822Name(email) => {
                names.insert(AltName::Email(email.to_string()));
            }
            GeneralName::URI(uri) => {
                names.insert(AltName::Uri(uri.to_string()));
            }
            _ => {}
        }
    }

    Ok(names)
}

/// 两份证书是否声明了相同且非空的 SAN 集合
/// 任一证书无法解析或没有 SAN 时返回 false
pub fn same_alt_names(a: &[u8], b: &[u8]) -> bool {
    match (subject_alt_names(a), subject_alt_names(b)) {
        (Ok(a), Ok(b)) => !a.is_empty() && a == b,
        _ => false,
    }
}

/// 证书过期时间（notAfter）
pub fn expiration(data: &[u8]) -> Result<DateTime<Utc>, SecurityError> {
    let cert = parse(data)?;
    let timestamp = cert.validity().not_after.timestamp();
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .ok_or_else(|| SecurityError::Certificate(format!("invalid notAfter: {}", timestamp)))
}
