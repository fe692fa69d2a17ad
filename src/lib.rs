//! Multi-tenant TLS/HTTP front door library.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;
pub mod tls;

pub use config::schema::FrontDoorConfig;
pub use http::FrontDoor;
pub use lifecycle::Shutdown;
