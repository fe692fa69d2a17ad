//! Dual-protocol front door.
//!
//! # Responsibilities
//! - Own the plaintext and TLS listeners
//! - Resolve the TLS context from the ClientHello before handshaking
//! - Serve HTTP/1.1 and HTTP/2 (ALPN) through one shared router
//! - Stop accepting and drain connections on shutdown
//!
//! # Design Decisions
//! - Bind failures are fatal; nothing is served until both listeners exist
//! - The ClientHello is read first so SNI resolution can be async
//! - A failed handshake only closes that connection

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, extract::ConnectInfo, Router};
use hyper::{body::Incoming, service::service_fn, Request};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_rustls::LazyConfigAcceptor;
use tower::ServiceExt;

use crate::config::FrontDoorConfig;
use crate::http::pipeline::{build_router, PipelineState};
use crate::http::request::ConnectionMeta;
use crate::lifecycle::Shutdown;
use crate::net::{
    ConnectionGuard, ConnectionState, ConnectionTracker, HandshakeKind, Listener, ListenerError,
};
use crate::observability::metrics;
use crate::tls::TlsContextResolver;

/// Time allowed to receive the ClientHello and finish the handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Protocol {
    Plain,
    Tls,
}

struct Shared {
    app: Router,
    resolver: Arc<TlsContextResolver>,
    tracker: ConnectionTracker,
    shutdown: Shutdown,
}

/// The bound front door, ready to run.
pub struct FrontDoor {
    http: Listener,
    https: Listener,
    app: Router,
    resolver: Arc<TlsContextResolver>,
    tracker: ConnectionTracker,
    drain_timeout: Duration,
}

impl FrontDoor {
    /// Bind both listeners. Fails if either address cannot be bound.
    pub async fn bind(
        config: &FrontDoorConfig,
        resolver: Arc<TlsContextResolver>,
        pipeline: PipelineState,
    ) -> Result<Self, ListenerError> {
        let http = Listener::bind("http", &config.http).await?;
        let https = Listener::bind("https", &config.https).await?;

        let app = build_router(pipeline, Duration::from_secs(config.request_timeout_secs));

        Ok(Self {
            http,
            https,
            app,
            resolver,
            tracker: ConnectionTracker::new(),
            drain_timeout: Duration::from_secs(config.shutdown.drain_timeout_secs),
        })
    }

    /// Bound addresses as `(http, https)`.
    pub fn local_addrs(&self) -> std::io::Result<(SocketAddr, SocketAddr)> {
        Ok((self.http.local_addr()?, self.https.local_addr()?))
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Serve until `shutdown` fires, then drain open connections.
    pub async fn run(self, shutdown: Shutdown) {
        let tracker = self.tracker.clone();
        let shared = Arc::new(Shared {
            app: self.app,
            resolver: self.resolver,
            tracker: self.tracker,
            shutdown,
        });

        tracing::info!("Front door serving");

        let http = tokio::spawn(accept_loop(self.http, Protocol::Plain, Arc::clone(&shared)));
        let https = tokio::spawn(accept_loop(self.https, Protocol::Tls, Arc::clone(&shared)));
        for task in [http, https] {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Accept loop terminated abnormally");
            }
        }

        tracing::info!(active = tracker.active_count(), "Listeners closed, draining connections");
        if tracker.wait_for_drain(self.drain_timeout).await {
            tracing::info!("All connections drained");
        } else {
            tracing::warn!(
                remaining = tracker.active_count(),
                timeout_secs = self.drain_timeout.as_secs(),
                "Drain timeout elapsed, abandoning remaining connections"
            );
        }
    }
}

async fn accept_loop(listener: Listener, protocol: Protocol, shared: Arc<Shared>) {
    let mut shutdown_rx = shared.shutdown.subscribe();
    let local_addr = listener.local_addr().ok();

    loop {
        let accepted = tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer_addr, permit)) => {
                let shared = Arc::clone(&shared);
                let local_addr = stream.local_addr().ok().or(local_addr);
                let guard = shared.tracker.track(listener.name());
                // Subscribed before the task starts so a shutdown during the
                // handshake is still seen.
                let conn_shutdown = shared.shutdown.subscribe();

                tokio::spawn(async move {
                    let _permit = permit;
                    let Some(local_addr) = local_addr else {
                        return;
                    };
                    let meta = ConnectionMeta {
                        peer_addr,
                        local_addr,
                        server_name: None,
                        secure: protocol == Protocol::Tls,
                    };
                    match protocol {
                        Protocol::Plain => serve_plain(stream, meta, guard, conn_shutdown, &shared).await,
                        Protocol::Tls => serve_tls(stream, meta, guard, conn_shutdown, &shared).await,
                    }
                });
            }
            Err(ListenerError::Closed) => break,
            Err(e) => {
                tracing::warn!(listener = listener.name(), error = %e, "Accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }

    tracing::info!(listener = listener.name(), "Stopped accepting connections");
}

type ShutdownRx = broadcast::Receiver<()>;

async fn serve_plain(
    stream: TcpStream,
    meta: ConnectionMeta,
    mut guard: ConnectionGuard,
    shutdown_rx: ShutdownRx,
    shared: &Shared,
) {
    guard.transition(ConnectionState::Serving);
    serve_http(stream, meta, &mut guard, shutdown_rx, shared).await;
}

async fn serve_tls(
    stream: TcpStream,
    mut meta: ConnectionMeta,
    mut guard: ConnectionGuard,
    mut shutdown_rx: ShutdownRx,
    shared: &Shared,
) {
    guard.transition(ConnectionState::Handshaking);

    let handshake = async {
        let start = LazyConfigAcceptor::new(rustls::server::Acceptor::default(), stream).await?;
        let server_name = start.client_hello().server_name().map(str::to_string);
        let context = shared.resolver.resolve(server_name.as_deref().unwrap_or("")).await;
        let tls = start.into_stream(context.server_config()).await?;
        Ok::<_, std::io::Error>((tls, server_name))
    };

    let handshake = tokio::select! {
        result = tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake) => result,
        _ = shutdown_rx.recv() => {
            tracing::debug!(connection_id = %guard.id(), peer_addr = %meta.peer_addr, "Shutdown during TLS handshake");
            return;
        }
    };

    let (tls, server_name) = match handshake {
        Ok(Ok(done)) => done,
        Ok(Err(e)) => {
            tracing::debug!(
                connection_id = %guard.id(),
                peer_addr = %meta.peer_addr,
                error = %e,
                "TLS handshake failed"
            );
            return;
        }
        Err(_) => {
            tracing::debug!(connection_id = %guard.id(), peer_addr = %meta.peer_addr, "TLS handshake timed out");
            return;
        }
    };

    let (_, session) = tls.get_ref();
    let kind = HandshakeKind::from_rustls(session.handshake_kind());
    let alpn = session
        .alpn_protocol()
        .map(|p| String::from_utf8_lossy(p).into_owned())
        .unwrap_or_default();
    tracing::debug!(
        connection_id = %guard.id(),
        server_name = server_name.as_deref().unwrap_or(""),
        alpn = %alpn,
        handshake = kind.as_str(),
        "TLS session established"
    );

    metrics::record_handshake(kind.as_str());
    guard.transition(kind.state());
    meta.server_name = server_name;
    guard.transition(ConnectionState::Serving);
    serve_http(tls, meta, &mut guard, shutdown_rx, shared).await;
}

/// Run HTTP/1.1 or HTTP/2 on an established stream until it closes.
async fn serve_http<S>(
    io: S,
    meta: ConnectionMeta,
    guard: &mut ConnectionGuard,
    mut shutdown_rx: ShutdownRx,
    shared: &Shared,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let app = shared.app.clone();
    let service = service_fn(move |mut request: Request<Incoming>| {
        let app = app.clone();
        let meta = meta.clone();
        async move {
            request.extensions_mut().insert(ConnectInfo(meta.peer_addr));
            request.extensions_mut().insert(meta);
            let response = app.oneshot(request.map(Body::new)).await?;
            Ok::<_, Infallible>(response)
        }
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection_with_upgrades(TokioIo::new(io), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = shutdown_rx.recv() => {
            guard.transition(ConnectionState::Draining);
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        tracing::debug!(connection_id = %guard.id(), error = %e, "Connection closed with error");
    }
}
