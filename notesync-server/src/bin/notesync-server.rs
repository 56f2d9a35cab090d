/// NoteSync reference server binary
///
/// Serves the sync routes, /health and /metrics on one HTTP listener. Notes
/// are held in memory for the lifetime of the process.

use anyhow::Context;
use clap::Parser;
use notesync_server::{metrics, router, AppState};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "notesync-server")]
#[command(about = "NoteSync reference sync server", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, env = "NOTESYNC_ADDR", default_value = "127.0.0.1:3000")]
    addr: SocketAddr,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Default to info level, can override with RUST_LOG
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .with_level(true)
            .init();
    }

    metrics::register_metrics();
    info!("Initialized Prometheus metrics");

    let app = router(AppState::default());
    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .with_context(|| format!("failed to bind {}", args.addr))?;

    info!(
        "Starting NoteSync server on {} with /api/syncnotes, /api/fetchnotes, /api/deletenote, /health, /metrics",
        args.addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("server error")?;

    Ok(())
}
