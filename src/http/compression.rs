//! Response compression.
//!
//! # Responsibilities
//! - Pick gzip, deflate or identity from `Accept-Encoding`
//! - Encode the buffered body and write the response once
//!
//! # Design Decisions
//! - Substring match in fixed priority order, no q-value negotiation
//! - `Vary: Accept-Encoding` is always present, whatever was chosen
//! - `deflate` is the zlib-wrapped format HTTP clients expect

use std::io::Write;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Response, StatusCode};
use bytes::Bytes;
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;

use crate::routing::handler::Reply;

/// Content coding applied to a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Gzip,
    Deflate,
    Identity,
}

impl Encoding {
    /// Choose an encoding from the request's `Accept-Encoding` value.
    pub fn negotiate(accept_encoding: Option<&HeaderValue>) -> Self {
        let accepted = accept_encoding
            .and_then(|v| v.to_str().ok())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        if accepted.contains("gzip") {
            Encoding::Gzip
        } else if accepted.contains("deflate") {
            Encoding::Deflate
        } else {
            Encoding::Identity
        }
    }

    /// `Content-Encoding` token, `None` for identity.
    pub fn token(&self) -> Option<&'static str> {
        match self {
            Encoding::Gzip => Some("gzip"),
            Encoding::Deflate => Some("deflate"),
            Encoding::Identity => None,
        }
    }

    pub fn encode(&self, body: &[u8]) -> std::io::Result<Bytes> {
        match self {
            Encoding::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(body)?;
                Ok(encoder.finish()?.into())
            }
            Encoding::Deflate => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(body)?;
                Ok(encoder.finish()?.into())
            }
            Encoding::Identity => Ok(Bytes::copy_from_slice(body)),
        }
    }
}

/// Ensure `Vary` lists `Accept-Encoding` exactly once.
pub fn add_vary_accept_encoding(headers: &mut HeaderMap) {
    let present = headers
        .get_all(header::VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|v| v.trim().eq_ignore_ascii_case("accept-encoding"));

    if !present {
        headers.append(header::VARY, HeaderValue::from_static("accept-encoding"));
    }
}

/// Turn a handler reply into the final response, compressing the body.
///
/// A reply without a status is sent as `200 OK`.
pub fn compress_reply(accept_encoding: Option<&HeaderValue>, reply: Reply) -> Response<Body> {
    let Reply { status, mut headers, body } = reply;

    let mut encoding = Encoding::negotiate(accept_encoding);
    let body = match encoding.encode(&body) {
        Ok(encoded) => encoded,
        Err(e) => {
            tracing::warn!(error = %e, encoding = ?encoding, "Compression failed, sending identity");
            encoding = Encoding::Identity;
            body
        }
    };

    headers.remove(header::CONTENT_ENCODING);
    if let Some(token) = encoding.token() {
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static(token));
    }
    add_vary_accept_encoding(&mut headers);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status.unwrap_or(StatusCode::OK);
    *response.headers_mut() = headers;
    response
}
