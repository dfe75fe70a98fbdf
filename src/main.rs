//! Ladder proxy (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────▶ http server ──▶ chain pool ──▶ ProxyChain
//!                                                  │ resolve target
//!                                                  │ request modifiers
//!                                                  ▼
//!                                             upstream client ──────▶ Target site
//!                                                  │
//!                                                  │ response modifiers
//!     Client Response                              ▼
//!     ◀────────── streamed body ◀──── HTML rewriter (text/html only)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use ladder::config::{load_config, validate_config, ConfigError, ProxyConfig};
use ladder::modifiers::ModifierCatalog;
use ladder::observability::{init_logging, metrics};
use ladder::HttpServer;

#[derive(Debug, Parser)]
#[command(name = "ladder", version, about = "Self-hosted rewriting forward proxy")]
struct Args {
    /// Path to a TOML config file; built-in defaults are used without one.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let catalog = ModifierCatalog::builtin();

    let config = match &args.config {
        Some(path) => load_config(path, &catalog)?,
        None => {
            let config = ProxyConfig::default();
            validate_config(&config, &catalog).map_err(ConfigError::Validation)?;
            config
        }
    };

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ladder starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_modifiers = config.modifiers.request.len(),
        response_modifiers = config.modifiers.response.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(
        address = %local_addr,
        "Listening for connections"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let server = HttpServer::new(config, &catalog)?;
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
