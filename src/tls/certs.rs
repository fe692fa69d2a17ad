//! Certificate lookup.
//!
//! Certificates are issued and stored elsewhere; the front door only reads
//! the current record for a domain.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::routing::domain::Domain;

/// The current certificate of a tenant domain.
#[derive(Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    pub domain: Domain,
    /// PEM-encoded private key.
    pub private_key: Vec<u8>,
    /// PEM-encoded certificate chain, leaf first.
    pub certificate_chain: Vec<u8>,
    /// Leaf `notAfter`, seconds since the epoch. Changes on every rotation.
    pub expires_at: i64,
}

impl CertificateRecord {
    /// Both key and chain material are present.
    pub fn is_complete(&self) -> bool {
        !self.private_key.is_empty() && !self.certificate_chain.is_empty()
    }
}

impl fmt::Debug for CertificateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateRecord")
            .field("domain", &self.domain)
            .field("private_key", &"<redacted>")
            .field("certificate_chain_len", &self.certificate_chain.len())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CertificateError {
    #[error("certificate store unavailable: {0}")]
    Unavailable(String),
    #[error("malformed certificate for {domain}: {reason}")]
    Malformed { domain: Domain, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lookup interface of the certificate store.
#[async_trait]
pub trait CertificateSource: Send + Sync {
    /// Current record for `domain`, `None` when no certificate exists.
    async fn load_certificate(&self, domain: &Domain) -> Result<Option<CertificateRecord>, CertificateError>;
}

/// In-process certificate store.
#[derive(Debug, Default)]
pub struct MemoryCertificateStore {
    records: DashMap<Domain, CertificateRecord>,
}

impl MemoryCertificateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or rotate the certificate of `record.domain`.
    pub fn put(&self, record: CertificateRecord) {
        self.records.insert(record.domain.clone(), record);
    }

    pub fn remove(&self, domain: &Domain) {
        self.records.remove(domain);
    }
}

#[async_trait]
impl CertificateSource for MemoryCertificateStore {
    async fn load_certificate(&self, domain: &Domain) -> Result<Option<CertificateRecord>, CertificateError> {
        Ok(self.records.get(domain).map(|r| r.value().clone()))
    }
}

/// Reads `<root>/<domain>/key.pem` and `<root>/<domain>/cert.pem`.
#[derive(Debug, Clone)]
pub struct DirectoryCertificateStore {
    root: PathBuf,
}

impl DirectoryCertificateStore {
    pub const KEY_FILE: &'static str = "key.pem";
    pub const CERT_FILE: &'static str = "cert.pem";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn domain_dir(&self, domain: &Domain) -> Option<PathBuf> {
        let name = domain.as_str();
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            return None;
        }
        Some(self.root.join(name))
    }
}

#[async_trait]
impl CertificateSource for DirectoryCertificateStore {
    async fn load_certificate(&self, domain: &Domain) -> Result<Option<CertificateRecord>, CertificateError> {
        let Some(dir) = self.domain_dir(domain) else {
            return Ok(None);
        };

        let certificate_chain = match tokio::fs::read(dir.join(Self::CERT_FILE)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let private_key = match tokio::fs::read(dir.join(Self::KEY_FILE)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let expires_at = leaf_expiry(&certificate_chain).map_err(|reason| CertificateError::Malformed {
            domain: domain.clone(),
            reason,
        })?;

        Ok(Some(CertificateRecord {
            domain: domain.clone(),
            private_key,
            certificate_chain,
            expires_at,
        }))
    }
}

/// `notAfter` of the first certificate in a PEM chain.
pub fn leaf_expiry(chain_pem: &[u8]) -> Result<i64, String> {
    let mut reader = chain_pem;
    let leaf = rustls_pemfile::certs(&mut reader)
        .next()
        .ok_or_else(|| "no certificate in chain".to_string())?
        .map_err(|e| e.to_string())?;

    let (_, cert) = x509_parser::parse_x509_certificate(leaf.as_ref()).map_err(|e| e.to_string())?;
    Ok(cert.validity().not_after.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::context::generate_fallback;

    #[tokio::test]
    async fn memory_store_rotation() {
        let store = MemoryCertificateStore::new();
        let domain = Domain::normalize("example.test");
        assert!(store.load_certificate(&domain).await.unwrap().is_none());

        let record = CertificateRecord {
            domain: domain.clone(),
            private_key: b"key".to_vec(),
            certificate_chain: b"chain".to_vec(),
            expires_at: 1,
        };
        store.put(record.clone());
        store.put(CertificateRecord { expires_at: 2, ..record });

        let loaded = store.load_certificate(&domain).await.unwrap().unwrap();
        assert_eq!(loaded.expires_at, 2);
    }

    #[tokio::test]
    async fn directory_store_reads_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let domain = Domain::normalize("example.test");
        let (key, chain) = generate_fallback().unwrap();
        std::fs::create_dir(dir.path().join("example.test")).unwrap();
        std::fs::write(dir.path().join("example.test/key.pem"), &key).unwrap();
        std::fs::write(dir.path().join("example.test/cert.pem"), &chain).unwrap();

        let store = DirectoryCertificateStore::new(dir.path());
        let record = store.load_certificate(&domain).await.unwrap().unwrap();
        assert!(record.is_complete());
        assert_eq!(record.expires_at, leaf_expiry(&chain).unwrap());
        assert!(record.expires_at > 0);

        let missing = Domain::normalize("other.test");
        assert!(store.load_certificate(&missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn directory_store_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryCertificateStore::new(dir.path());
        let sneaky = Domain::normalize("../etc");
        assert!(store.load_certificate(&sneaky).await.unwrap().is_none());
    }

    #[test]
    fn debug_redacts_key() {
        let record = CertificateRecord {
            domain: Domain::normalize("example.test"),
            private_key: b"secret".to_vec(),
            certificate_chain: Vec::new(),
            expires_at: 0,
        };
        assert!(!format!("{record:?}").contains("secret"));
        assert!(!record.is_complete());
    }
}
