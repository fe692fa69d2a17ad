//! Domain routing subsystem.
//!
//! # Data Flow
//! ```text
//! Raw host (Host header, :authority, SNI)
//!     → domain.rs (normalize to a Domain key)
//!     → zone.rs (routing-relevant records for the Domain)
//!     → handler.rs (tenant handler produces the Reply)
//! ```
//!
//! # Design Decisions
//! - One normalization routine for every host source
//! - Zone store and handler are injected trait objects
//! - Handler errors never escape the pipeline

pub mod domain;
pub mod handler;
pub mod zone;

pub use domain::{normalize, Domain};
pub use handler::{DomainHandler, HandlerError, Reply, ZoneRoutingHandler};
pub use zone::{MemoryZoneStore, RecordKind, ZoneError, ZoneRecord, ZoneResolver};
