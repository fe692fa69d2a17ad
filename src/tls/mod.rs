//! TLS subsystem.
//!
//! # Data Flow
//! ```text
//! ClientHello (SNI)
//!     → resolver.rs (normalize, zone check, certificate lookup)
//!     → cache.rs (reuse context while expiry unchanged)
//!     → context.rs (build rustls::ServerConfig on miss)
//!     → handshake continues with the chosen context
//!
//! Session resumption:
//!     rustls session hooks
//!     → tickets.rs ExternalSessionStore (sync bridge)
//!     → SessionTicketAdapter (hex keys, TTLs, timeouts)
//!     → TicketStore (shared keyed store)
//! ```
//!
//! # Design Decisions
//! - Resolution never fails a handshake; the default identity always exists
//! - One session store is shared by every context
//! - Certificate and ticket stores are injected trait objects

pub mod cache;
pub mod certs;
pub mod context;
pub mod error;
pub mod resolver;
pub mod tickets;

pub use cache::{CacheStorage, ContextCache, ContextCacheEntry};
pub use certs::{
    CertificateError, CertificateRecord, CertificateSource, DirectoryCertificateStore,
    MemoryCertificateStore,
};
pub use context::{CipherPolicy, ContextBuilder, DhParams, TlsContext};
pub use error::TlsError;
pub use resolver::TlsContextResolver;
pub use tickets::{
    ExternalSessionStore, MemoryTicketStore, SessionTicketAdapter, TicketStore, TicketStoreError,
};
