//! Stream Supervisor (loopcast-sv) - Main entry point
//!
//! Hosts the stream supervisor and its HTTP/SSE control surface.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::RwLock;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use loopcast_common::config::{default_settings_path, SessionSettings};
use loopcast_sv::api::{self, AppContext};
use loopcast_sv::session_log::SessionLog;
use loopcast_sv::{Config, SharedState, StreamSupervisor};

/// Command-line arguments for loopcast-sv
#[derive(Parser, Debug)]
#[command(name = "loopcast-sv")]
#[command(about = "Stream supervisor service for loopcast")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5750", env = "LOOPCAST_PORT")]
    port: u16,

    /// Transcoder executable name or path
    #[arg(long, default_value = "ffmpeg", env = "LOOPCAST_TRANSCODER")]
    transcoder: String,

    /// Session settings file (defaults to the platform config directory)
    #[arg(long, env = "LOOPCAST_SETTINGS")]
    settings: Option<PathBuf>,

    /// Operator-facing session log file
    #[arg(long, default_value = "logs/stream.log", env = "LOOPCAST_LOG")]
    log_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loopcast_sv=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config {
        bind_addr: format!("0.0.0.0:{}", args.port),
        transcoder_bin: args.transcoder,
        settings_path: args.settings.unwrap_or_else(default_settings_path),
        log_path: args.log_file,
    };

    info!("Starting loopcast stream supervisor on {}", config.bind_addr);
    info!("Transcoder: {}", config.transcoder_bin);
    info!("Settings file: {}", config.settings_path.display());

    // Load persisted session settings; a broken file falls back to defaults
    let settings = SessionSettings::load(&config.settings_path).unwrap_or_else(|e| {
        warn!("Could not load settings: {}", e);
        SessionSettings::default()
    });

    let session_log = Arc::new(
        SessionLog::open(&config.log_path)
            .with_context(|| format!("Failed to open session log {}", config.log_path.display()))?,
    );
    let state = Arc::new(SharedState::new());
    let supervisor = Arc::new(StreamSupervisor::new(
        config.transcoder_bin.clone(),
        Arc::clone(&state),
        Arc::clone(&session_log),
    ));

    let ctx = AppContext {
        supervisor: Arc::clone(&supervisor),
        state,
        settings: Arc::new(RwLock::new(settings)),
        settings_path: Arc::new(config.settings_path.clone()),
    };
    let app = api::create_router(ctx);

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.bind_addr))?;

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Make sure no transcoder outlives the service
    supervisor.stop().await;
    supervisor.join_session().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
