//! TLS context construction.
//!
//! # Responsibilities
//! - Parse PEM key/chain material into a `rustls::ServerConfig`
//! - Apply the cipher policy, ALPN list and shared session store
//! - Build the default identity from files or generate one
//!
//! # Design Decisions
//! - Every context shares one session store, so a ticket issued under one
//!   tenant certificate can be looked up by any process serving the platform
//! - Contexts are reference counted; cache hits hand out the same instance
//! - An explicit crypto provider is used instead of the process default

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::StoresServerSessions;
use rustls::{ServerConfig, SupportedCipherSuite};

use crate::config::TlsConfig;
use crate::routing::domain::Domain;
use crate::tls::error::TlsError;

/// ALPN identifiers offered by the secure listener, in preference order.
pub const ALPN_H2: &[u8] = b"h2";
pub const ALPN_HTTP11: &[u8] = b"http/1.1";

/// Name given to the generated fallback certificate.
const FALLBACK_NAME: &str = "localhost";

/// A ready-to-use server identity.
#[derive(Clone)]
pub struct TlsContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    config: Arc<ServerConfig>,
    leaf: CertificateDer<'static>,
    domain: Option<Domain>,
}

impl TlsContext {
    /// The rustls configuration to finish the handshake with.
    pub fn server_config(&self) -> Arc<ServerConfig> {
        Arc::clone(&self.inner.config)
    }

    /// First certificate of the served chain.
    pub fn leaf_certificate(&self) -> &CertificateDer<'static> {
        &self.inner.leaf
    }

    /// Tenant domain, `None` for the default identity.
    pub fn domain(&self) -> Option<&Domain> {
        self.inner.domain.as_ref()
    }

    pub fn is_default(&self) -> bool {
        self.inner.domain.is_none()
    }

    /// True when both handles point at the same built context.
    pub fn same_instance(&self, other: &TlsContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsContext")
            .field("domain", &self.inner.domain)
            .field("alpn", &self.inner.config.alpn_protocols.len())
            .finish_non_exhaustive()
    }
}

/// Allowed cipher suites, by rustls/IANA name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherPolicy {
    names: Vec<String>,
}

impl CipherPolicy {
    /// Parse a colon- or comma-separated suite list.
    pub fn parse(list: &str) -> Result<Self, TlsError> {
        let known: Vec<String> = ring::default_provider()
            .cipher_suites
            .iter()
            .map(suite_name)
            .collect();

        let mut names = Vec::new();
        for name in list.split([':', ',']).map(str::trim).filter(|s| !s.is_empty()) {
            let name = name.to_ascii_uppercase();
            if !known.contains(&name) {
                return Err(TlsError::Ciphers(format!("unknown cipher suite {name}")));
            }
            if !names.contains(&name) {
                names.push(name);
            }
        }

        if names.is_empty() {
            return Err(TlsError::Ciphers("no cipher suites listed".to_string()));
        }
        Ok(Self { names })
    }

    fn apply(&self, provider: &mut CryptoProvider) {
        provider
            .cipher_suites
            .retain(|suite| self.names.contains(&suite_name(suite)));
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

fn suite_name(suite: &SupportedCipherSuite) -> String {
    format!("{:?}", suite.suite())
}

/// Finite-field Diffie-Hellman parameters.
///
/// rustls negotiates (EC)DHE groups only, so the parameters are validated and
/// carried for visibility but never handed to the handshake.
#[derive(Debug, Clone)]
pub struct DhParams {
    pem: Vec<u8>,
}

impl DhParams {
    const PEM_TAG: &'static str = "-----BEGIN DH PARAMETERS-----";

    pub fn from_pem(pem: Vec<u8>) -> Result<Self, TlsError> {
        let text = String::from_utf8_lossy(&pem);
        if !text.contains(Self::PEM_TAG) {
            return Err(TlsError::DhParams("missing DH PARAMETERS block".to_string()));
        }
        Ok(Self { pem })
    }

    pub fn load(path: &Path) -> Result<Self, TlsError> {
        Self::from_pem(std::fs::read(path)?)
    }

    pub fn len(&self) -> usize {
        self.pem.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pem.is_empty()
    }
}

/// Builds `TlsContext`s that share provider, ALPN and session storage.
pub struct ContextBuilder {
    provider: Arc<CryptoProvider>,
    sessions: Arc<dyn StoresServerSessions + Send + Sync>,
    alpn: Vec<Vec<u8>>,
    dh_params: Option<DhParams>,
}

impl ContextBuilder {
    pub fn new(sessions: Arc<dyn StoresServerSessions + Send + Sync>) -> Self {
        Self {
            provider: Arc::new(ring::default_provider()),
            sessions,
            alpn: vec![ALPN_H2.to_vec(), ALPN_HTTP11.to_vec()],
            dh_params: None,
        }
    }

    /// Builder configured from the `[tls]` section.
    pub fn from_config(
        config: &TlsConfig,
        sessions: Arc<dyn StoresServerSessions + Send + Sync>,
    ) -> Result<Self, TlsError> {
        let mut builder = Self::new(sessions);

        if let Some(list) = &config.ciphers {
            let policy = CipherPolicy::parse(list)?;
            tracing::info!(suites = ?policy.names(), "Cipher policy applied");
            builder = builder.with_cipher_policy(&policy);
        }

        if let Some(path) = &config.dh_param_path {
            let params = DhParams::load(path)?;
            tracing::info!(
                path = %path.display(),
                "DH parameters loaded; handshakes use (EC)DHE groups only"
            );
            builder = builder.with_dh_params(params);
        }

        Ok(builder)
    }

    pub fn with_cipher_policy(mut self, policy: &CipherPolicy) -> Self {
        let mut provider = (*self.provider).clone();
        policy.apply(&mut provider);
        self.provider = Arc::new(provider);
        self
    }

    pub fn with_dh_params(mut self, params: DhParams) -> Self {
        self.dh_params = Some(params);
        self
    }

    pub fn with_alpn(mut self, protocols: Vec<Vec<u8>>) -> Self {
        self.alpn = protocols;
        self
    }

    pub fn dh_params(&self) -> Option<&DhParams> {
        self.dh_params.as_ref()
    }

    /// Build a context from PEM-encoded key and certificate chain.
    pub fn build(
        &self,
        domain: Option<Domain>,
        key_pem: &[u8],
        chain_pem: &[u8],
    ) -> Result<TlsContext, TlsError> {
        let chain = parse_chain(chain_pem)?;
        let key = parse_key(key_pem)?;
        let leaf = chain[0].clone();

        let mut config = ServerConfig::builder_with_provider(Arc::clone(&self.provider))
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(chain, key)?;
        config.alpn_protocols = self.alpn.clone();
        config.session_storage = self.sessions.clone();

        Ok(TlsContext {
            inner: Arc::new(ContextInner {
                config: Arc::new(config),
                leaf,
                domain,
            }),
        })
    }

    /// Build the process-wide default identity.
    ///
    /// Uses the configured key/certificate files, or a generated self-signed
    /// `localhost` certificate when none are configured.
    pub fn build_default(&self, config: &TlsConfig) -> Result<TlsContext, TlsError> {
        let (key_pem, chain_pem) = match (&config.default_key_path, &config.default_cert_path) {
            (Some(key), Some(cert)) => {
                tracing::info!(cert = %cert.display(), "Loading default identity");
                (std::fs::read(key)?, std::fs::read(cert)?)
            }
            _ => {
                tracing::warn!("No default certificate configured, generating a self-signed one");
                generate_fallback()?
            }
        };

        self.build(None, &key_pem, &chain_pem)
    }
}

/// Generate a self-signed key and certificate as PEM.
pub fn generate_fallback() -> Result<(Vec<u8>, Vec<u8>), TlsError> {
    let params = rcgen::CertificateParams::new(vec![FALLBACK_NAME.to_string()])?;
    let key_pair = rcgen::KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;
    Ok((key_pair.serialize_pem().into_bytes(), cert.pem().into_bytes()))
}

pub(crate) fn parse_chain(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = pem;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::CertificateLoad(e.to_string()))?;

    if certs.is_empty() {
        return Err(TlsError::CertificateLoad("no certificates found".to_string()));
    }
    Ok(certs)
}

fn parse_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = pem;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| TlsError::KeyLoad(e.to_string()))?
        .ok_or_else(|| TlsError::KeyLoad("no private key found".to_string()))
}
