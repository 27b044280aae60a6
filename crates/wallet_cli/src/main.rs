//! Wallet sync server launcher.
//!
//! Runs the sync server on an in-memory store until Ctrl-C.

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wallet_store::MemoryStore;
use wallet_sync_server::{ServerConfig, ServerError, SyncServer, DEFAULT_PORT};

/// Wallet synchronization server.
#[derive(Parser, Debug)]
#[command(name = "wallet-sync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to listen on
    #[arg(short, long, default_value_t = SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)))]
    bind: SocketAddr,

    /// Maximum concurrent connections
    #[arg(long, default_value_t = 1000)]
    max_connections: usize,

    /// Seconds a session may stay silent before it is dropped
    #[arg(long, default_value_t = 30)]
    idle_timeout_secs: u64,

    /// Largest accepted frame, in bytes
    #[arg(long, default_value_t = 16 * 1024 * 1024)]
    max_frame_bytes: usize,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        ServerConfig::new(self.bind)
            .with_max_connections(self.max_connections)
            .with_idle_timeout(Duration::from_secs(self.idle_timeout_secs))
            .with_max_frame_len(self.max_frame_bytes)
    }
}

#[derive(Error, Debug)]
enum CliError {
    #[error("server error: {0}")]
    Server(#[from] ServerError),

    #[error("session task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let store = Arc::new(MemoryStore::new());
    let server = SyncServer::bind(cli.server_config(), store).await?;
    info!(
        addr = %server.local_addr()?,
        version = env!("CARGO_PKG_VERSION"),
        "wallet sync server listening"
    );

    let shutdown = server.shutdown_handle();
    let stats = server.stats();
    let running = tokio::spawn(server.run());

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for ctrl-c, shutting down");
    }
    info!("shutdown requested");
    shutdown.shutdown();
    running.await??;

    let stats = stats.snapshot();
    info!(
        accepted = stats.connections_accepted,
        rejected = stats.connections_rejected,
        committed = stats.sessions_committed,
        rolled_back = stats.sessions_rolled_back,
        "bye"
    );
    Ok(())
}
