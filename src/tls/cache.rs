//! TLS context cache.
//!
//! # Responsibilities
//! - Keep one built context per tenant domain
//! - Invalidate an entry when the certificate's expiry changes
//!
//! # Design Decisions
//! - Validity is equality on `expires_at`: rotation always moves the expiry
//! - No size bound or LRU; the entry count is exported as a gauge instead
//! - Concurrent rebuilds of one domain race benignly (last insert wins)

use std::sync::Arc;

use dashmap::DashMap;

use crate::observability::metrics;
use crate::routing::domain::Domain;
use crate::tls::context::TlsContext;

/// A cached context and the certificate expiry it was built from.
#[derive(Debug, Clone)]
pub struct ContextCacheEntry {
    pub domain: Domain,
    pub expires_at: i64,
    pub context: TlsContext,
}

/// Backing map for the context cache.
pub trait CacheStorage: Send + Sync {
    fn get(&self, domain: &Domain) -> Option<ContextCacheEntry>;
    fn insert(&self, entry: ContextCacheEntry);
    fn remove(&self, domain: &Domain);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStorage for DashMap<Domain, ContextCacheEntry> {
    fn get(&self, domain: &Domain) -> Option<ContextCacheEntry> {
        DashMap::get(self, domain).map(|r| r.value().clone())
    }

    fn insert(&self, entry: ContextCacheEntry) {
        DashMap::insert(self, entry.domain.clone(), entry);
    }

    fn remove(&self, domain: &Domain) {
        DashMap::remove(self, domain);
    }

    fn len(&self) -> usize {
        DashMap::len(self)
    }
}

/// Cache of built tenant contexts keyed by domain.
#[derive(Clone)]
pub struct ContextCache {
    storage: Arc<dyn CacheStorage>,
}

impl ContextCache {
    pub fn new() -> Self {
        Self::with_storage(Arc::new(DashMap::<Domain, ContextCacheEntry>::new()))
    }

    pub fn with_storage(storage: Arc<dyn CacheStorage>) -> Self {
        Self { storage }
    }

    /// Cached context for `domain` if it was built from a certificate
    /// expiring at `expires_at`.
    pub fn get_valid(&self, domain: &Domain, expires_at: i64) -> Option<TlsContext> {
        let entry = self.storage.get(domain)?;
        if entry.expires_at == expires_at {
            Some(entry.context)
        } else {
            tracing::debug!(
                domain = %domain,
                cached_expires_at = entry.expires_at,
                current_expires_at = expires_at,
                "Certificate rotated, discarding cached context"
            );
            self.storage.remove(domain);
            metrics::record_cache_size(self.storage.len());
            None
        }
    }

    /// Store `context`, replacing any entry for the same domain.
    pub fn insert(&self, domain: Domain, expires_at: i64, context: TlsContext) {
        self.storage.insert(ContextCacheEntry {
            domain,
            expires_at,
            context,
        });
        metrics::record_cache_size(self.storage.len());
    }

    pub fn invalidate(&self, domain: &Domain) {
        self.storage.remove(domain);
        metrics::record_cache_size(self.storage.len());
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

impl Default for ContextCache {
    fn default() -> Self {
        Self::new()
    }
}
