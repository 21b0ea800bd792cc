//! Gateway Admin Control Plane
//!
//! Operators edit a draft configuration through the admin API and publish it
//! to a fleet of gateway instances as one versioned snapshot.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────────┐
//!                     │                      GATEWAY ADMIN                        │
//!                     │                                                           │
//!   Admin request     │  ┌─────────┐   ┌─────────┐   ┌──────────┐   ┌──────────┐  │
//!   ──────────────────┼─▶│   net   │──▶│  http   │──▶│  admin   │──▶│   auth   │  │
//!                     │  │listener │   │ server  │   │ handlers │   │ session/ │  │
//!                     │  └─────────┘   └─────────┘   └────┬─────┘   │  policy  │  │
//!                     │                                   │         └──────────┘  │
//!                     │                     ┌─────────────┴────────────┐          │
//!                     │                     ▼                          ▼          │
//!                     │              ┌─────────────┐           ┌──────────────┐   │
//!                     │              │    store    │◀──commit──│   release    │───┼──▶ Gateway
//!                     │              │draft/publish│──snapshot▶│ coordinator  │   │    fleet
//!                     │              └─────────────┘           └──────────────┘   │
//!                     │                                                           │
//!                     │  ┌─────────────────────────────────────────────────────┐  │
//!                     │  │               Cross-Cutting Concerns                 │  │
//!                     │  │  config (+watcher) │ observability │ resilience │    │  │
//!                     │  │  lifecycle (signals, shutdown)                       │  │
//!                     │  └─────────────────────────────────────────────────────┘  │
//!                     └──────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::sync::mpsc;

use gateway_admin::config::{load_config, AdminConfig, ConfigWatcher};
use gateway_admin::lifecycle::{shutdown_signal, Shutdown};
use gateway_admin::net::{self, listener::parse_address, load_tls_config};
use gateway_admin::observability::{logging, metrics};
use gateway_admin::AdminServer;

#[derive(Parser)]
#[command(name = "gateway-admin", version, about = "Admin control plane for an API gateway fleet")]
struct Args {
    /// TOML configuration file. Built-in defaults are used without one.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => AdminConfig::default(),
    };

    logging::init_logging(&config.observability.log_level)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gateway-admin starting");
    tracing::info!(
        bind_address = %config.server.bind_address,
        tls = config.server.tls.is_some(),
        data_dir = ?config.store.data_dir,
        targets = config.release.targets.len(),
        accounts = config.auth.accounts.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    // The watcher handle has to stay alive for updates to keep flowing.
    let (config_updates, _watcher) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (updates, Some(watcher.run()?))
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (updates, None)
        }
    };

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.trigger();
    });

    let server = AdminServer::new(config.clone())?;
    match &config.server.tls {
        Some(tls) => {
            let rustls = load_tls_config(tls).await?;
            let addr = parse_address(&config.server.bind_address)?;
            server
                .run_tls(addr, rustls, config_updates, server_shutdown)
                .await?;
        }
        None => {
            let listener = net::bind(&config.server.bind_address).await?;
            server.run(listener, config_updates, server_shutdown).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
