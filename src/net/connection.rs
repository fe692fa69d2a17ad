//! Connection state machine and lifecycle tracking.
//!
//! # Responsibilities
//! - Track connection state (Accepted → Handshaking → Resumed | FullHandshake → Serving → Closed)
//! - Generate unique connection IDs for tracing
//! - Count open connections per listener for graceful drain
//! - Record the handshake kind of TLS connections

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::observability::metrics;

/// Relaxed ordering is enough, IDs only need to be unique.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection state for lifecycle tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// TCP accepted, nothing read yet.
    Accepted,
    /// Reading the ClientHello and resolving the TLS context.
    Handshaking,
    /// TLS session resumed from the ticket store.
    Resumed,
    /// TLS session established with a full handshake.
    FullHandshake,
    /// Serving HTTP requests.
    Serving,
    /// Finishing in-flight requests after shutdown was requested.
    Draining,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Accepted => "accepted",
            ConnectionState::Handshaking => "handshaking",
            ConnectionState::Resumed => "resumed",
            ConnectionState::FullHandshake => "full_handshake",
            ConnectionState::Serving => "serving",
            ConnectionState::Draining => "draining",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// How a TLS session was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeKind {
    Full,
    Resumed,
}

impl HandshakeKind {
    pub fn from_rustls(kind: Option<rustls::HandshakeKind>) -> Self {
        match kind {
            Some(rustls::HandshakeKind::Resumed) => HandshakeKind::Resumed,
            _ => HandshakeKind::Full,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HandshakeKind::Full => "full",
            HandshakeKind::Resumed => "resumed",
        }
    }

    pub fn state(&self) -> ConnectionState {
        match self {
            HandshakeKind::Full => ConnectionState::FullHandshake,
            HandshakeKind::Resumed => ConnectionState::Resumed,
        }
    }
}

/// Tracks open connections for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    inner: Arc<TrackerInner>,
}

#[derive(Debug, Default)]
struct TrackerInner {
    active_count: AtomicU64,
    closed: Notify,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection on `listener`. The returned guard closes it on drop.
    pub fn track(&self, listener: &'static str) -> ConnectionGuard {
        self.inner.active_count.fetch_add(1, Ordering::SeqCst);
        metrics::connection_opened(listener);
        ConnectionGuard {
            tracker: Arc::clone(&self.inner),
            listener,
            id: ConnectionId::new(),
            state: ConnectionState::Accepted,
        }
    }

    pub fn active_count(&self) -> u64 {
        self.inner.active_count.load(Ordering::SeqCst)
    }

    /// Wait until every tracked connection is closed.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let drained = async {
            loop {
                let notified = self.inner.closed.notified();
                if self.active_count() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, drained).await.is_ok()
    }
}

/// Guard that tracks a connection's lifetime.
#[derive(Debug)]
pub struct ConnectionGuard {
    tracker: Arc<TrackerInner>,
    listener: &'static str,
    id: ConnectionId,
    state: ConnectionState,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn transition(&mut self, next: ConnectionState) {
        tracing::trace!(connection_id = %self.id, from = %self.state, to = %next, "Connection state");
        self.state = next;
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.state = ConnectionState::Closed;
        self.tracker.active_count.fetch_sub(1, Ordering::SeqCst);
        self.tracker.closed.notify_waiters();
        metrics::connection_closed(self.listener);
        tracing::trace!(connection_id = %self.id, listener = self.listener, "Connection closed");
    }
}
