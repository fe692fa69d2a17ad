//! TLS subsystem errors.

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("Failed to load certificate: {0}")]
    CertificateLoad(String),
    #[error("Failed to load private key: {0}")]
    KeyLoad(String),
    #[error("Failed to build TLS config: {0}")]
    ConfigBuild(#[from] rustls::Error),
    #[error("Invalid cipher policy: {0}")]
    Ciphers(String),
    #[error("Invalid DH parameters: {0}")]
    DhParams(String),
    #[error("Failed to generate fallback identity: {0}")]
    Generate(#[from] rcgen::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
