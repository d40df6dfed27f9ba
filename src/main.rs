//! Chat gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────┐
//!                         │                 CHAT GATEWAY                 │
//!                         │                                              │
//!   Browser  ── HTTP ─────┼─▶ /api/hello ──▶ JSON greeting               │
//!            ── HTTP ─────┼─▶ /api/llm   ──▶ POST <upstream>/llm ────────┼──▶ Backend
//!            ◀─ WS ───────┼─▶ /api/ws/chat                               │
//!                         │      │                                       │
//!                         │      ▼                                       │
//!                         │   relay session ◀──── WS ───────────────────┼──▶ <upstream>/ws/chat
//!                         │   (two forwarding tasks + coordinator)       │
//!                         │                                              │
//!                         │   config · observability · lifecycle         │
//!                         └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use chat_gateway::config::{resolve_config, ConfigWatcher};
use chat_gateway::lifecycle::{signals, Shutdown};
use chat_gateway::observability::{logging, metrics};
use chat_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "chat-gateway")]
#[command(about = "API gateway with a WebSocket chat relay", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Reload the configuration file when it changes.
    #[arg(long, requires = "config")]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = resolve_config(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability);

    tracing::info!("chat-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.base_url,
        max_sessions = config.listener.max_sessions,
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

    // The watcher task ends on its own once the server drops the receiver.
    let config_updates = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            watcher.spawn()?;
            updates
        }
        _ => {
            let (_, updates) = mpsc::unbounded_channel();
            updates
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    let server = HttpServer::new(config)?;
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
