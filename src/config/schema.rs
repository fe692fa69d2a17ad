//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the front door.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::routing::zone::ZoneRecord;

/// Root configuration for the front door.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FrontDoorConfig {
    /// Plaintext HTTP listener.
    pub http: ListenerConfig,

    /// TLS listener (HTTP/2 with HTTP/1.1 fallback).
    pub https: ListenerConfig,

    /// Default identity, cipher policy and session tickets.
    pub tls: TlsConfig,

    /// Value of the `Server` response header.
    pub server_header_value: String,

    /// Total time allowed for one request, in seconds.
    pub request_timeout_secs: u64,

    /// Logical template name → template file.
    pub templates: HashMap<String, PathBuf>,

    /// Directory-backed certificate store.
    pub certificates: CertificateStoreConfig,

    /// Static zone records served by the in-process zone store.
    pub zones: Vec<ZoneConfig>,

    pub shutdown: ShutdownConfig,

    pub observability: ObservabilityConfig,
}

impl Default for FrontDoorConfig {
    fn default() -> Self {
        Self {
            http: ListenerConfig {
                host: "0.0.0.0".to_string(),
                port: 80,
                max_connections: 10_000,
            },
            https: ListenerConfig {
                host: "0.0.0.0".to_string(),
                port: 443,
                max_connections: 10_000,
            },
            tls: TlsConfig::default(),
            server_header_value: "frontdoor".to_string(),
            request_timeout_secs: 30,
            templates: HashMap::new(),
            certificates: CertificateStoreConfig::default(),
            zones: Vec::new(),
            shutdown: ShutdownConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind (e.g., "0.0.0.0", "::").
    pub host: String,

    /// TCP port; 0 picks an ephemeral port.
    pub port: u16,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl ListenerConfig {
    /// `host:port`, bracketing IPv6 hosts.
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            max_connections: 10_000,
        }
    }
}

/// TLS configuration for the secure listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Private key of the default identity (PEM). Unset = generated.
    pub default_key_path: Option<PathBuf>,

    /// Certificate chain of the default identity (PEM). Unset = generated.
    pub default_cert_path: Option<PathBuf>,

    /// Finite-field DH parameters (PEM).
    pub dh_param_path: Option<PathBuf>,

    /// Colon-separated cipher suite names, e.g. "TLS13_AES_128_GCM_SHA256".
    pub ciphers: Option<String>,

    /// TTL for newly stored sessions, in seconds.
    pub session_new_ttl_secs: u64,

    /// TTL applied when a stored session is resumed, in seconds.
    pub session_resume_ttl_secs: u64,

    /// Upper bound for one ticket store call, in milliseconds.
    pub ticket_store_timeout_ms: u64,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            default_key_path: None,
            default_cert_path: None,
            dh_param_path: None,
            ciphers: None,
            session_new_ttl_secs: 30 * 60,
            session_resume_ttl_secs: 5 * 60,
            ticket_store_timeout_ms: 500,
        }
    }
}

/// Certificate store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CertificateStoreConfig {
    /// Root holding `<domain>/key.pem` and `<domain>/cert.pem`.
    /// Unset = certificates are only available from the in-memory store.
    pub dir: Option<PathBuf>,
}

/// Zone entry seeding the in-process zone store.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ZoneConfig {
    pub domain: String,
    #[serde(default)]
    pub records: Vec<ZoneRecord>,
}

/// Shutdown behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long in-flight connections may take to finish, in seconds.
    pub drain_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { drain_timeout_secs: 30 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::zone::RecordKind;

    #[test]
    fn parses_minimal_toml() {
        let config: FrontDoorConfig = toml::from_str(
            r#"
            server_header_value = "edge-1"

            [http]
            port = 8080

            [https]
            host = "::"
            port = 8443

            [tls]
            ciphers = "TLS13_AES_128_GCM_SHA256"

            [templates]
            "500" = "/etc/frontdoor/500.html"

            [[zones]]
            domain = "example.test"
            records = [{ kind = "TXT", value = "route=web" }]
            "#,
        )
        .unwrap();

        assert_eq!(config.server_header_value, "edge-1");
        assert_eq!(config.http.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.https.bind_address(), "[::]:8443");
        assert_eq!(config.tls.session_new_ttl_secs, 1800);
        assert_eq!(config.tls.session_resume_ttl_secs, 300);
        assert_eq!(config.zones[0].records[0].kind, RecordKind::Txt);
        assert!(config.templates.contains_key("500"));
    }

    #[test]
    fn defaults_use_standard_ports() {
        let config = FrontDoorConfig::default();
        assert_eq!(config.http.port, 80);
        assert_eq!(config.https.port, 443);
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
    }
}
