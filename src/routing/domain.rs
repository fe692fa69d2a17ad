//! Host canonicalization.
//!
//! # Responsibilities
//! - Strip `:port` suffixes and IPv6 brackets
//! - Lowercase and IDNA-fold domain names (punycode)
//! - Produce a stable key for cache and zone lookups
//!
//! # Design Decisions
//! - Never fails: unparseable input degrades to its lowercased form
//! - Idempotent: normalizing a `Domain` again yields the same value
//! - IP literals keep their canonical textual form

use std::fmt;
use std::net::IpAddr;

/// A normalized host name.
///
/// Lowercase, no port, no brackets, no trailing dot. An empty `Domain`
/// means "no host" and never matches tenant routing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Domain(String);

impl Domain {
    /// Normalize a raw host (`Host` header, `:authority`, or SNI name).
    pub fn normalize(raw: &str) -> Self {
        let host = strip_port(raw.trim());
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        let host = host.strip_suffix('.').unwrap_or(host);

        if host.is_empty() {
            return Self::default();
        }

        if let Ok(ip) = host.parse::<IpAddr>() {
            return Self(ip.to_string());
        }

        match url::Host::parse(host) {
            Ok(url::Host::Domain(d)) => Self(d),
            Ok(url::Host::Ipv4(ip)) => Self(ip.to_string()),
            Ok(url::Host::Ipv6(ip)) => Self(ip.to_string()),
            Err(_) => Self(host.to_lowercase()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Host shown to visitors on error pages: a leading `www.` is dropped.
    pub fn display_host(&self) -> &str {
        self.0.strip_prefix("www.").unwrap_or(&self.0)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Domain {
    fn from(raw: &str) -> Self {
        Self::normalize(raw)
    }
}

/// Convenience wrapper for call sites that only hold a string.
pub fn normalize(raw: &str) -> Domain {
    Domain::normalize(raw)
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // "[v6]" or "[v6]:port"
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }

    // A bare IPv6 literal carries several colons and no port.
    match host.rsplit_once(':') {
        Some((name, port))
            if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) =>
        {
            name
        }
        _ => host,
    }
}
