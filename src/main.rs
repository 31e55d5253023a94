//! Round-robin HTTP load balancer.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────┐
//!                         │                  LOAD BALANCER                    │
//!                         │                                                   │
//!     Client Request      │  ┌─────────┐    ┌────────────┐    ┌────────────┐  │
//!     ────────────────────┼─▶│  http   │───▶│ dispatcher │───▶│  registry  │  │
//!                         │  │ server  │    │ retry/fail │    │ round-robin│  │
//!                         │  └─────────┘    │   over     │    └─────┬──────┘  │
//!                         │                 └─────┬──────┘          │         │
//!                         │                       ▼                 │         │
//!     Client Response     │                 ┌────────────┐          │         │
//!     ◀───────────────────┼─────────────────│ forwarder  │◀─────────┘         │
//!                         │                 └─────┬──────┘                    │
//!                         │                       │                           │
//!                         │  ┌─────────┐          ▼                           │
//!                         │  │ health  │──TCP──▶ Backends ◀──── HTTP ─────────┼──
//!                         │  │ probe   │                                      │
//!                         │  └─────────┘                                      │
//!                         │  config reload · admin API · metrics · shutdown   │
//!                         └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use rr_balancer::config::watcher::ConfigWatcher;
use rr_balancer::lifecycle::startup::{resolve_config, Overrides};
use rr_balancer::observability::{logging, metrics};
use rr_balancer::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "rr-balancer")]
#[command(about = "Round-robin HTTP load balancer with health checks and failover", long_about = None)]
struct Cli {
    /// Backend URLs, comma separated (overrides the config file)
    #[arg(short, long)]
    servers: Option<String>,

    /// Port to serve on
    #[arg(short, long)]
    port: Option<u16>,

    /// TOML config file; its backend list is reloaded on change
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let overrides = Overrides {
        servers: cli.servers,
        port: cli.port,
        log_level: cli.log_level,
    };

    let config = resolve_config(cli.config.as_deref(), &overrides)?;
    logging::init(&config.observability.log_level);

    tracing::info!(
        bind_address = %config.listener.bind_address,
        backends = config.backends.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    // Hot reload only when a file was given; flag-only runs get a closed channel.
    let (config_updates, _watcher) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path, config.clone(), overrides.clone());
            (updates, Some(watcher.run()?))
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (updates, None)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown.clone().trigger_on_signal());

    let server = HttpServer::new(config);
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
