//! Request handling and transformation.
//!
//! # Responsibilities
//! - Carry per-connection facts (peer, local address, SNI) into requests
//! - Extract the routing host: `:authority`, then `Host`, then SNI, then
//!   the local address
//! - Resolve the request route against the chosen host
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - The host is normalized once and shared by handler and error page

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{header, Request, Uri};

use crate::routing::domain::Domain;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Facts about the connection a request arrived on.
#[derive(Debug, Clone)]
pub struct ConnectionMeta {
    pub peer_addr: SocketAddr,
    pub local_addr: SocketAddr,
    /// SNI server name sent in the ClientHello, TLS only.
    pub server_name: Option<String>,
    pub secure: bool,
}

/// What the pipeline knows about one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub client_addr: SocketAddr,
    pub host: Domain,
    /// Request path resolved against `host`.
    pub route: String,
    pub secure: bool,
}

impl RequestContext {
    pub fn from_request(request: &Request<Body>, client_addr: SocketAddr) -> Self {
        let meta = request.extensions().get::<ConnectionMeta>();
        let host = extract_host(request, meta);
        let route = resolve_route(&host, request.uri());
        let request_id = request
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        Self {
            request_id,
            client_addr,
            host,
            route,
            secure: meta.is_some_and(|m| m.secure),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_test(host: &str, route: &str) -> Self {
        Self {
            request_id: "test".to_string(),
            client_addr: SocketAddr::from(([127, 0, 0, 1], 40000)),
            host: Domain::normalize(host),
            route: route.to_string(),
            secure: false,
        }
    }
}

/// Routing host of a request, normalized.
pub fn extract_host(request: &Request<Body>, meta: Option<&ConnectionMeta>) -> Domain {
    if let Some(authority) = request.uri().authority() {
        let domain = Domain::normalize(authority.as_str());
        if !domain.is_empty() {
            return domain;
        }
    }

    if let Some(host) = request.headers().get(header::HOST).and_then(|v| v.to_str().ok()) {
        let domain = Domain::normalize(host);
        if !domain.is_empty() {
            return domain;
        }
    }

    match meta {
        Some(ConnectionMeta { server_name: Some(name), .. }) if !name.is_empty() => Domain::normalize(name),
        Some(meta) => Domain::normalize(&meta.local_addr.ip().to_string()),
        None => Domain::default(),
    }
}

/// Path of `uri` once resolved as a URL on `host`.
pub fn resolve_route(host: &Domain, uri: &Uri) -> String {
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let authority = match host.as_str() {
        "" => "localhost".to_string(),
        h if h.contains(':') => format!("[{h}]"),
        h => h.to_string(),
    };

    match url::Url::parse(&format!("http://{authority}{path}")) {
        Ok(url) => url.path().to_string(),
        Err(_) => uri.path().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(server_name: Option<&str>) -> ConnectionMeta {
        ConnectionMeta {
            peer_addr: SocketAddr::from(([10, 0, 0, 2], 5555)),
            local_addr: SocketAddr::from(([10, 0, 0, 1], 443)),
            server_name: server_name.map(str::to_string),
            secure: true,
        }
    }

    #[test]
    fn prefers_authority_over_host_header() {
        let request = Request::builder()
            .uri("https://Authority.Test/x")
            .header(header::HOST, "host.test")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_host(&request, None).as_str(), "authority.test");
    }

    #[test]
    fn uses_host_header() {
        let request = Request::builder()
            .uri("/x")
            .header(header::HOST, "WWW.Example.test:8080")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_host(&request, None).as_str(), "www.example.test");
    }

    #[test]
    fn falls_back_to_sni_then_local_address() {
        let request = Request::builder().uri("/x").body(Body::empty()).unwrap();
        assert_eq!(extract_host(&request, Some(&meta(Some("sni.test")))).as_str(), "sni.test");
        assert_eq!(extract_host(&request, Some(&meta(None))).as_str(), "10.0.0.1");
        assert!(extract_host(&request, None).is_empty());
    }

    #[test]
    fn route_is_resolved_path() {
        let host = Domain::normalize("example.test");
        assert_eq!(resolve_route(&host, &"/foo?bar=1".parse().unwrap()), "/foo");
        assert_eq!(resolve_route(&host, &"/a/../b".parse().unwrap()), "/b");
        assert_eq!(resolve_route(&Domain::normalize("::1"), &"/v6".parse().unwrap()), "/v6");
        assert_eq!(resolve_route(&Domain::default(), &"/".parse().unwrap()), "/");
    }

    #[test]
    fn context_reads_request_id_and_meta() {
        let mut request = Request::builder()
            .uri("/foo")
            .header(header::HOST, "example.test")
            .header(X_REQUEST_ID, "abc")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(meta(None));

        let ctx = RequestContext::from_request(&request, SocketAddr::from(([10, 0, 0, 2], 5555)));
        assert_eq!(ctx.request_id, "abc");
        assert_eq!(ctx.route, "/foo");
        assert!(ctx.secure);
    }
}
