//! Metrics collection and exposition.
//!
//! # Metrics
//! - `frontdoor_tls_resolutions_total` (counter): SNI resolutions by outcome
//! - `frontdoor_tls_context_cache_entries` (gauge): cached tenant contexts
//! - `frontdoor_session_events_total` (counter): ticket store calls by event, outcome
//! - `frontdoor_requests_total` (counter): responses by status
//! - `frontdoor_request_duration_seconds` (histogram): pipeline latency
//! - `frontdoor_active_connections` (gauge): open connections per listener
//! - `frontdoor_tls_handshakes_total` (counter): completed handshakes by kind
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Labels are low-cardinality; domains are never used as labels

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Outcome of one SNI resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOutcome {
    CacheHit,
    Built,
    NoServerName,
    NoZone,
    NoCertificate,
    Error,
}

impl ResolutionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionOutcome::CacheHit => "cache_hit",
            ResolutionOutcome::Built => "built",
            ResolutionOutcome::NoServerName => "no_server_name",
            ResolutionOutcome::NoZone => "no_zone",
            ResolutionOutcome::NoCertificate => "no_certificate",
            ResolutionOutcome::Error => "error",
        }
    }
}

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_resolution(outcome: ResolutionOutcome) {
    counter!("frontdoor_tls_resolutions_total", "outcome" => outcome.as_str()).increment(1);
}

pub fn record_cache_size(entries: usize) {
    gauge!("frontdoor_tls_context_cache_entries").set(entries as f64);
}

pub fn record_session_event(event: &'static str, outcome: &'static str) {
    counter!("frontdoor_session_events_total", "event" => event, "outcome" => outcome).increment(1);
}

pub fn record_request(status: u16, start: Instant) {
    counter!("frontdoor_requests_total", "status" => status.to_string()).increment(1);
    histogram!("frontdoor_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_handshake(kind: &'static str) {
    counter!("frontdoor_tls_handshakes_total", "kind" => kind).increment(1);
}

pub fn connection_opened(listener: &'static str) {
    gauge!("frontdoor_active_connections", "listener" => listener).increment(1.0);
}

pub fn connection_closed(listener: &'static str) {
    gauge!("frontdoor_active_connections", "listener" => listener).decrement(1.0);
}
