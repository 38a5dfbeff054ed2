// 数据模型模块

pub mod site;
pub mod trust;

pub use site::{Credentials, IdentityKey, LogonType, ServerIdentity, Site};
pub use trust::{CertificateRecord, InsecureHost, TrustRecords};
