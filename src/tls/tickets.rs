//! Externalized TLS session storage.
//!
//! # Responsibilities
//! - Persist new sessions in a keyed store shared by every front door process
//! - Look sessions up again on resumption, sliding their TTL
//! - Bridge rustls' synchronous session hooks onto the async store
//!
//! # Design Decisions
//! - Store keys are the lowercase hex of the session id
//! - Store failures and timeouts degrade to a full handshake, never an error
//! - Writes are fire-and-forget; reads block the handshake task only

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rustls::server::StoresServerSessions;
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::config::TlsConfig;
use crate::observability::metrics;

#[derive(Debug, thiserror::Error)]
pub enum TicketStoreError {
    #[error("ticket store unavailable: {0}")]
    Unavailable(String),
    #[error("ticket store call timed out after {0:?}")]
    Timeout(Duration),
}

/// Keyed byte store with per-key TTL.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Store `value` under `key` for `ttl`.
    async fn write(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), TicketStoreError>;

    /// Read `key`; on a hit its TTL is reset to `refresh_ttl`.
    async fn read(&self, key: &str, refresh_ttl: Duration) -> Result<Option<Vec<u8>>, TicketStoreError>;
}

/// In-process ticket store with lazy expiry.
#[derive(Debug, Default)]
pub struct MemoryTicketStore {
    entries: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("ticket store mutex poisoned");
        let before = entries.len();
        entries.retain(|_, (_, deadline)| *deadline > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("ticket store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn write(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), TicketStoreError> {
        let mut entries = self.entries.lock().expect("ticket store mutex poisoned");
        entries.insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn read(&self, key: &str, refresh_ttl: Duration) -> Result<Option<Vec<u8>>, TicketStoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("ticket store mutex poisoned");
        match entries.get_mut(key) {
            Some((value, deadline)) if *deadline > now => {
                *deadline = now + refresh_ttl;
                Ok(Some(value.clone()))
            }
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

/// Proxies TLS session events to a `TicketStore`.
///
/// Both operations always complete; failures are logged and folded into
/// "not stored" / "not found".
#[derive(Clone)]
pub struct SessionTicketAdapter {
    store: Arc<dyn TicketStore>,
    new_session_ttl: Duration,
    resume_ttl: Duration,
    call_timeout: Duration,
}

impl SessionTicketAdapter {
    pub const DEFAULT_NEW_SESSION_TTL: Duration = Duration::from_secs(30 * 60);
    pub const DEFAULT_RESUME_TTL: Duration = Duration::from_secs(5 * 60);
    pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(500);

    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self {
            store,
            new_session_ttl: Self::DEFAULT_NEW_SESSION_TTL,
            resume_ttl: Self::DEFAULT_RESUME_TTL,
            call_timeout: Self::DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn from_config(store: Arc<dyn TicketStore>, config: &TlsConfig) -> Self {
        Self {
            store,
            new_session_ttl: Duration::from_secs(config.session_new_ttl_secs),
            resume_ttl: Duration::from_secs(config.session_resume_ttl_secs),
            call_timeout: Duration::from_millis(config.ticket_store_timeout_ms),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Persist a new session. Returns once the write finished or failed.
    pub async fn on_new_session(&self, id: &[u8], payload: Vec<u8>) {
        let key = hex::encode(id);
        let write = self.store.write(&key, payload, self.new_session_ttl);

        match self.bounded(write).await {
            Ok(()) => {
                metrics::record_session_event("new", "stored");
                tracing::trace!(session = %key, "Session stored");
            }
            Err(e) => {
                metrics::record_session_event("new", "error");
                tracing::warn!(session = %key, error = %e, "Failed to store session");
            }
        }
    }

    /// Look up a stored session. `None` means a full handshake.
    pub async fn on_resume_session(&self, id: &[u8]) -> Option<Vec<u8>> {
        let key = hex::encode(id);
        let read = self.store.read(&key, self.resume_ttl);

        match self.bounded(read).await {
            Ok(Some(payload)) => {
                metrics::record_session_event("resume", "hit");
                tracing::trace!(session = %key, "Session found");
                Some(payload)
            }
            Ok(None) => {
                metrics::record_session_event("resume", "miss");
                None
            }
            Err(e) => {
                metrics::record_session_event("resume", "error");
                tracing::warn!(session = %key, error = %e, "Failed to read session");
                None
            }
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, TicketStoreError>>,
    ) -> Result<T, TicketStoreError> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .unwrap_or(Err(TicketStoreError::Timeout(self.call_timeout)))
    }
}

/// rustls session storage backed by a `SessionTicketAdapter`.
///
/// rustls calls these hooks synchronously from inside the handshake. Writes
/// are spawned onto the runtime; reads run the adapter with `block_in_place`,
/// which needs the multi-thread runtime. On any other runtime flavour a read
/// reports a miss and the client gets a full handshake.
#[derive(Clone)]
pub struct ExternalSessionStore {
    adapter: SessionTicketAdapter,
}

impl ExternalSessionStore {
    pub fn new(adapter: SessionTicketAdapter) -> Self {
        Self { adapter }
    }

    fn lookup(&self, key: &[u8]) -> Option<Vec<u8>> {
        let handle = Handle::try_current().ok()?;
        match handle.runtime_flavor() {
            RuntimeFlavor::MultiThread => {
                let adapter = self.adapter.clone();
                tokio::task::block_in_place(|| handle.block_on(adapter.on_resume_session(key)))
            }
            _ => {
                tracing::debug!("Session lookup skipped outside the multi-thread runtime");
                None
            }
        }
    }
}

impl fmt::Debug for ExternalSessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalSessionStore").finish_non_exhaustive()
    }
}

impl StoresServerSessions for ExternalSessionStore {
    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> bool {
        let Ok(handle) = Handle::try_current() else {
            return false;
        };
        let adapter = self.adapter.clone();
        handle.spawn(async move { adapter.on_new_session(&key, value).await });
        true
    }

    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.lookup(key)
    }

    // Sessions are shared across processes, so a resumed session stays
    // available until its TTL lapses.
    fn take(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.lookup(key)
    }

    fn can_cache(&self) -> bool {
        true
    }
}
