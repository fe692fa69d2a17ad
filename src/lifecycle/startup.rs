//! Startup orchestration.
//!
//! # Responsibilities
//! - Build collaborators (zones, certificates, tickets, handler)
//! - Build the TLS context builder, default identity and resolver
//! - Load error templates
//! - Bind listeners and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners bind last (traffic only when ready)

use std::sync::Arc;
use std::time::Duration;

use crate::config::FrontDoorConfig;
use crate::http::{FrontDoor, PipelineState, TemplateError, TemplateRegistry};
use crate::lifecycle::shutdown::Shutdown;
use crate::net::ListenerError;
use crate::routing::{DomainHandler, MemoryZoneStore, ZoneResolver, ZoneRoutingHandler};
use crate::tls::{
    CertificateSource, ContextBuilder, DirectoryCertificateStore, ExternalSessionStore,
    MemoryCertificateStore, MemoryTicketStore, SessionTicketAdapter, TicketStore, TlsContextResolver,
    TlsError,
};

const TICKET_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),
    #[error("Template setup failed: {0}")]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// External stores the front door talks to.
pub struct Collaborators {
    pub zones: Arc<dyn ZoneResolver>,
    pub certificates: Arc<dyn CertificateSource>,
    pub tickets: Arc<dyn TicketStore>,
    /// Tenant handler; defaults to [`ZoneRoutingHandler`] over `zones`.
    pub handler: Option<Arc<dyn DomainHandler>>,
}

impl Collaborators {
    /// In-process stores seeded from config.
    pub fn from_config(config: &FrontDoorConfig, tickets: Arc<dyn TicketStore>) -> Self {
        let certificates: Arc<dyn CertificateSource> = match &config.certificates.dir {
            Some(dir) => {
                tracing::info!(dir = %dir.display(), "Using directory certificate store");
                Arc::new(DirectoryCertificateStore::new(dir))
            }
            None => {
                tracing::info!("No certificate directory configured, tenants use the default identity");
                Arc::new(MemoryCertificateStore::new())
            }
        };

        Self {
            zones: Arc::new(MemoryZoneStore::from_config(&config.zones)),
            certificates,
            tickets,
            handler: None,
        }
    }
}

/// Everything the front door needs besides its listeners.
pub struct Services {
    pub resolver: Arc<TlsContextResolver>,
    pub pipeline: PipelineState,
}

/// Wire collaborators into the TLS resolver and request pipeline.
pub fn build_services(
    config: &FrontDoorConfig,
    collaborators: Collaborators,
) -> Result<Services, StartupError> {
    let Collaborators {
        zones,
        certificates,
        tickets,
        handler,
    } = collaborators;

    let adapter = SessionTicketAdapter::from_config(tickets, &config.tls);
    let sessions = Arc::new(ExternalSessionStore::new(adapter));
    let builder = Arc::new(ContextBuilder::from_config(&config.tls, sessions)?);
    let default_identity = builder.build_default(&config.tls)?;

    let resolver = Arc::new(TlsContextResolver::new(
        Arc::clone(&zones),
        certificates,
        builder,
        default_identity,
    ));

    let templates = Arc::new(TemplateRegistry::load(&config.templates)?);
    let handler = handler.unwrap_or_else(|| Arc::new(ZoneRoutingHandler::new(zones)));
    let pipeline = PipelineState::new(handler, templates, &config.server_header_value);

    Ok(Services { resolver, pipeline })
}

/// Periodically drop expired sessions from the in-process ticket store.
pub fn spawn_ticket_purge(store: Arc<MemoryTicketStore>, shutdown: &Shutdown) -> tokio::task::JoinHandle<()> {
    let mut shutdown_rx = shutdown.subscribe();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICKET_PURGE_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = interval.tick() => {
                    let removed = store.purge_expired();
                    if removed > 0 {
                        tracing::debug!(removed, remaining = store.len(), "Expired sessions purged");
                    }
                }
            }
        }
    })
}

/// Build, bind and serve until `shutdown` fires.
pub async fn run(config: &FrontDoorConfig, shutdown: Shutdown) -> Result<(), StartupError> {
    let tickets = Arc::new(MemoryTicketStore::new());
    let collaborators = Collaborators::from_config(config, tickets.clone());
    let services = build_services(config, collaborators)?;

    let door = FrontDoor::bind(config, services.resolver, services.pipeline).await?;
    let purge = spawn_ticket_purge(tickets, &shutdown);

    door.run(shutdown).await;
    let _ = purge.await;
    Ok(())
}
