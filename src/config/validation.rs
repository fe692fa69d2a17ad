//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referenced files exist (default identity, DH params, templates)
//! - Validate value ranges (timeouts > 0, distinct ports)
//! - Check the cipher policy names known suites
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: FrontDoorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::path::{Path, PathBuf};

use crate::config::schema::FrontDoorConfig;
use crate::routing::domain::Domain;
use crate::tls::context::CipherPolicy;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("http and https listeners both bind port {0}")]
    PortConflict(u16),
    #[error("{field}: file not found: {}", path.display())]
    MissingFile { field: String, path: PathBuf },
    #[error("tls.default_key_path and tls.default_cert_path must be set together")]
    PartialDefaultIdentity,
    #[error("tls.ciphers: {0}")]
    Ciphers(String),
    #[error("zone entry {0:?} has an empty domain")]
    EmptyZoneDomain(String),
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &FrontDoorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let non_zero = [
        ("http.max_connections", config.http.max_connections as u64),
        ("https.max_connections", config.https.max_connections as u64),
        ("request_timeout_secs", config.request_timeout_secs),
        ("tls.session_new_ttl_secs", config.tls.session_new_ttl_secs),
        ("tls.session_resume_ttl_secs", config.tls.session_resume_ttl_secs),
        ("tls.ticket_store_timeout_ms", config.tls.ticket_store_timeout_ms),
    ];
    for (field, value) in non_zero {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    if config.http.port != 0
        && config.http.port == config.https.port
        && config.http.host == config.https.host
    {
        errors.push(ValidationError::PortConflict(config.http.port));
    }

    match (&config.tls.default_key_path, &config.tls.default_cert_path) {
        (Some(key), Some(cert)) => {
            check_file(&mut errors, "tls.default_key_path", key);
            check_file(&mut errors, "tls.default_cert_path", cert);
        }
        (None, None) => {}
        _ => errors.push(ValidationError::PartialDefaultIdentity),
    }

    if let Some(path) = &config.tls.dh_param_path {
        check_file(&mut errors, "tls.dh_param_path", path);
    }

    if let Some(ciphers) = &config.tls.ciphers {
        if let Err(e) = CipherPolicy::parse(ciphers) {
            errors.push(ValidationError::Ciphers(e.to_string()));
        }
    }

    for (name, path) in &config.templates {
        check_file(&mut errors, &format!("templates.{name}"), path);
    }

    if let Some(dir) = &config.certificates.dir {
        if !dir.is_dir() {
            errors.push(ValidationError::MissingFile {
                field: "certificates.dir".to_string(),
                path: dir.clone(),
            });
        }
    }

    for zone in &config.zones {
        if Domain::normalize(&zone.domain).is_empty() {
            errors.push(ValidationError::EmptyZoneDomain(zone.domain.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_file(errors: &mut Vec<ValidationError>, field: &str, path: &Path) {
    if !path.is_file() {
        errors.push(ValidationError::MissingFile {
            field: field.to_string(),
            path: path.to_path_buf(),
        });
    }
}
