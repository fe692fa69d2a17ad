//! Multi-tenant TLS/HTTP front door.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌──────────────────────────────────────────────────────┐
//!                          │                     FRONT DOOR                        │
//!                          │                                                       │
//!   :80  ──────────────────┼─▶ net::listener ───────────────────────┐              │
//!                          │                                        ▼              │
//!   :443 ──────────────────┼─▶ net::listener ─▶ tls::resolver ─▶ http::server      │
//!           ClientHello    │                    │  (SNI)            │              │
//!                          │                    ▼                   ▼              │
//!                          │              tls::cache          http::pipeline       │
//!                          │              tls::context        routing::handler     │
//!                          │              tls::tickets        http::templates      │
//!                          │                                  http::compression    │
//!                          │                                        │              │
//!   response ◀─────────────┼────────────────────────────────────────┘              │
//!                          │                                                       │
//!                          │   config · observability · lifecycle                  │
//!                          └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use frontdoor::config::load_or_default;
use frontdoor::lifecycle::{signals, startup, Shutdown};
use frontdoor::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "frontdoor")]
#[command(about = "Multi-tenant TLS/HTTP front door", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "FRONTDOOR_CONFIG")]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_or_default(cli.config.as_deref())?;

    if cli.check {
        println!("configuration OK");
        return Ok(());
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "frontdoor starting");

    tracing::info!(
        http = %config.http.bind_address(),
        https = %config.https.bind_address(),
        zones = config.zones.len(),
        request_timeout_secs = config.request_timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    startup::run(&config, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
