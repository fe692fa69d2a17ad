//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (lifecycle tracking, state machine)
//!     → TLS handshake (https listener only, see crate::tls)
//!     → Hand off to HTTP layer
//!
//! Connection States:
//!     Accepted → Handshaking → Resumed | FullHandshake → Serving → Draining → Closed
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionState, ConnectionTracker, HandshakeKind};
pub use listener::{ConnectionPermit, Listener, ListenerError};
