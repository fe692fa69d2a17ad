//! Domain handler seam.
//!
//! # Responsibilities
//! - Define what the pipeline hands a tenant handler and what it gets back
//! - Provide the default zone-backed placeholder handler
//!
//! # Design Decisions
//! - Handlers return a buffered `Reply`; the pipeline owns status defaults,
//!   baseline headers and compression
//! - Any `Err` is turned into the rendered 500 page by the pipeline

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use bytes::Bytes;

use crate::http::request::RequestContext;
use crate::routing::zone::{RecordKind, ZoneError, ZoneResolver};

/// A buffered response produced by a domain handler.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    /// `None` lets the response path pick `200 OK`.
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_content_type(mut self, value: &'static str) -> Self {
        self.headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(value));
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("zone lookup failed: {0}")]
    Zone(#[from] ZoneError),
    #[error("{0}")]
    Other(String),
}

/// Produces the response for one request to a tenant domain.
#[async_trait]
pub trait DomainHandler: Send + Sync {
    async fn handle(&self, ctx: &RequestContext, request: Request<Body>) -> Result<Reply, HandlerError>;
}

#[async_trait]
impl<T: DomainHandler + ?Sized> DomainHandler for Arc<T> {
    async fn handle(&self, ctx: &RequestContext, request: Request<Body>) -> Result<Reply, HandlerError> {
        (**self).handle(ctx, request).await
    }
}

/// Body served by the placeholder handler.
pub const PLACEHOLDER_BODY: &str = "OK\n";

/// Looks the host up in the zone store and answers with a fixed body.
///
/// Redirect and content routing belong to the platform's routing service;
/// this handler only proves the lookup path works end to end.
pub struct ZoneRoutingHandler {
    zones: Arc<dyn ZoneResolver>,
}

impl ZoneRoutingHandler {
    pub fn new(zones: Arc<dyn ZoneResolver>) -> Self {
        Self { zones }
    }
}

#[async_trait]
impl DomainHandler for ZoneRoutingHandler {
    async fn handle(&self, ctx: &RequestContext, _request: Request<Body>) -> Result<Reply, HandlerError> {
        let records = self.zones.resolve(&ctx.host, RecordKind::Txt, true).await?;

        tracing::debug!(
            request_id = %ctx.request_id,
            domain = %ctx.host,
            records = records.len(),
            "Zone lookup complete"
        );

        Ok(Reply::new(PLACEHOLDER_BODY).with_content_type("text/plain; charset=utf-8"))
    }
}
