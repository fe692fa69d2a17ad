//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (listeners, SNI resolution, HTTP/1.1 + HTTP/2)
//!     → pipeline.rs (shared router and middleware)
//!     → request.rs (host, route, request ID)
//!     → tenant DomainHandler (crate::routing)
//!     → templates.rs (500 page on handler failure)
//!     → compression.rs (gzip / deflate / identity)
//!     → Send to client
//! ```

pub mod compression;
pub mod pipeline;
pub mod request;
pub mod server;
pub mod templates;

pub use compression::Encoding;
pub use pipeline::{build_router, PipelineState};
pub use request::{ConnectionMeta, RequestContext, X_REQUEST_ID};
pub use server::FrontDoor;
pub use templates::{TemplateError, TemplateRegistry, TemplateRenderer};
