//! Shared request pipeline.
//!
//! # Responsibilities
//! - Build the Axum router used by both listeners
//! - Extract client and host, set baseline headers
//! - Run the domain handler and turn failures into the 500 page
//! - Send every response through the compression path
//!
//! # Design Decisions
//! - One handler for every method and path; routing belongs to the tenant
//!   handler
//! - Handler failures never escape as dropped connections
//! - Error pages show the host without its `www.` prefix

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Request, Response, StatusCode},
    Router,
};
use serde_json::json;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::http::compression::{add_vary_accept_encoding, compress_reply};
use crate::http::request::RequestContext;
use crate::http::templates::{TemplateRenderer, INTERNAL_ERROR};
use crate::observability::metrics;
use crate::routing::handler::{DomainHandler, Reply};

/// State shared by every request on both listeners.
#[derive(Clone)]
pub struct PipelineState {
    pub handler: Arc<dyn DomainHandler>,
    pub templates: Arc<dyn TemplateRenderer>,
    /// Value of the `Server` header.
    pub server_header: HeaderValue,
    /// Budget for one domain handler call.
    pub request_timeout: Duration,
}

/// Handler budget until `build_router` sets the configured one.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

impl PipelineState {
    pub fn new(
        handler: Arc<dyn DomainHandler>,
        templates: Arc<dyn TemplateRenderer>,
        server_header: &str,
    ) -> Self {
        let server_header = HeaderValue::from_str(server_header).unwrap_or_else(|_| {
            tracing::warn!(value = %server_header, "Invalid server header value, using default");
            HeaderValue::from_static("frontdoor")
        });
        Self {
            handler,
            templates,
            server_header,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Build the router with all middleware layers.
///
/// `request_timeout` bounds the domain handler inside the pipeline, so a
/// slow handler still gets the 500 page and baseline headers.
pub fn build_router(mut state: PipelineState, request_timeout: Duration) -> Router {
    state.request_timeout = request_timeout;
    Router::new()
        .fallback(front_door_handler)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Pipeline entry point for every request.
async fn front_door_handler(
    State(state): State<PipelineState>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response<Body> {
    let start = Instant::now();
    let ctx = RequestContext::from_request(&request, client_addr);
    let accept_encoding = request.headers().get(header::ACCEPT_ENCODING).cloned();

    tracing::debug!(
        request_id = %ctx.request_id,
        client = %ctx.client_addr,
        domain = %ctx.host,
        route = %ctx.route,
        method = %request.method(),
        secure = ctx.secure,
        "Handling request"
    );

    let handled = tokio::time::timeout(state.request_timeout, state.handler.handle(&ctx, request)).await;
    let mut reply = match handled {
        Ok(Ok(reply)) => reply,
        Ok(Err(e)) => {
            tracing::error!(
                request_id = %ctx.request_id,
                domain = %ctx.host,
                route = %ctx.route,
                error = %e,
                "Domain handler failed"
            );
            error_reply(state.templates.as_ref(), &ctx)
        }
        Err(_) => {
            tracing::error!(
                request_id = %ctx.request_id,
                domain = %ctx.host,
                route = %ctx.route,
                timeout_ms = state.request_timeout.as_millis() as u64,
                "Domain handler timed out"
            );
            error_reply(state.templates.as_ref(), &ctx)
        }
    };

    reply
        .headers
        .entry(header::SERVER)
        .or_insert_with(|| state.server_header.clone());
    add_vary_accept_encoding(&mut reply.headers);

    let response = compress_reply(accept_encoding.as_ref(), reply);
    metrics::record_request(response.status().as_u16(), start);
    response
}

/// Rendered 500 page for a failed request.
pub fn error_reply(templates: &dyn TemplateRenderer, ctx: &RequestContext) -> Reply {
    let context = json!({
        "domain": ctx.host.display_host(),
        "route": ctx.route,
    });

    match templates.render(INTERNAL_ERROR, &context) {
        Ok(page) => Reply::new(page)
            .with_status(StatusCode::INTERNAL_SERVER_ERROR)
            .with_content_type("text/html; charset=utf-8"),
        Err(e) => {
            tracing::error!(
                request_id = %ctx.request_id,
                error = %e,
                "Failed to render error page"
            );
            Reply::new("Internal Server Error\n")
                .with_status(StatusCode::INTERNAL_SERVER_ERROR)
                .with_content_type("text/plain; charset=utf-8")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::templates::{TemplateError, TemplateRegistry};
    use crate::routing::handler::HandlerError;
    use async_trait::async_trait;
    use bytes::Bytes;
    use serde_json::Value;
    use std::sync::Mutex;
    use tower::ServiceExt;

    struct FailingHandler;

    #[async_trait]
    impl DomainHandler for FailingHandler {
        async fn handle(&self, _: &RequestContext, _: Request<Body>) -> Result<Reply, HandlerError> {
            Err(HandlerError::Other("boom".into()))
        }
    }

    struct EchoHostHandler;

    #[async_trait]
    impl DomainHandler for EchoHostHandler {
        async fn handle(&self, ctx: &RequestContext, _: Request<Body>) -> Result<Reply, HandlerError> {
            Ok(Reply::new(ctx.host.to_string()))
        }
    }

    struct SlowHandler;

    #[async_trait]
    impl DomainHandler for SlowHandler {
        async fn handle(&self, _: &RequestContext, _: Request<Body>) -> Result<Reply, HandlerError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Reply::new("late"))
        }
    }

    #[derive(Default)]
    struct RecordingTemplates {
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl TemplateRenderer for RecordingTemplates {
        fn render(&self, name: &str, context: &Value) -> Result<Bytes, TemplateError> {
            self.calls.lock().unwrap().push((name.to_string(), context.clone()));
            Ok(Bytes::from_static(b"<h1>error</h1>"))
        }
    }

    fn request(host: &str, path: &str) -> Request<Body> {
        let mut request = Request::builder()
            .uri(path)
            .header(header::HOST, host)
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
        request
    }

    #[tokio::test]
    async fn handler_failure_renders_error_template() {
        let templates = Arc::new(RecordingTemplates::default());
        let state = PipelineState::new(Arc::new(FailingHandler), templates.clone(), "edge");
        let app = build_router(state, Duration::from_secs(5));

        let response = app.oneshot(request("www.example.test", "/foo")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[header::SERVER], "edge");
        assert_eq!(response.headers()[header::VARY], "accept-encoding");
        assert!(response.headers().contains_key("x-request-id"));

        let calls = templates.calls.lock().unwrap();
        assert_eq!(
            calls.as_slice(),
            &[(
                INTERNAL_ERROR.to_string(),
                json!({ "domain": "example.test", "route": "/foo" })
            )]
        );
    }

    #[tokio::test]
    async fn successful_reply_gets_baseline_headers() {
        let state = PipelineState::new(
            Arc::new(EchoHostHandler),
            Arc::new(TemplateRegistry::builtin()),
            "edge",
        );
        let app = build_router(state, Duration::from_secs(5));

        let response = app.oneshot(request("Tenant.Test:80", "/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::SERVER], "edge");
        assert_eq!(response.headers()[header::VARY], "accept-encoding");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"tenant.test");
    }

    #[tokio::test]
    async fn slow_handler_gets_error_page_with_baseline_headers() {
        let templates = Arc::new(RecordingTemplates::default());
        let state = PipelineState::new(Arc::new(SlowHandler), templates.clone(), "edge");
        let app = build_router(state, Duration::from_millis(50));

        let response = app
            .oneshot(request("www.example.test", "/slow"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[header::SERVER], "edge");
        assert_eq!(response.headers()[header::VARY], "accept-encoding");

        let calls = templates.calls.lock().unwrap();
        assert_eq!(
            calls.as_slice(),
            &[(
                INTERNAL_ERROR.to_string(),
                json!({ "domain": "example.test", "route": "/slow" })
            )]
        );
    }

    #[test]
    fn error_reply_survives_template_failure() {
        struct Broken;
        impl TemplateRenderer for Broken {
            fn render(&self, name: &str, _: &Value) -> Result<Bytes, TemplateError> {
                Err(TemplateError::Unknown(name.to_string()))
            }
        }

        let reply = error_reply(&Broken, &RequestContext::for_test("www.example.test", "/"));
        assert_eq!(reply.status, Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!reply.body.is_empty());
    }
}
