//! Radiocast Server - headless continuous internet radio.
//!
//! Runs the radiocast engine and serves the listener stream, the status
//! events and the control endpoints over HTTP.

mod config;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use radiocast_core::{bootstrap_services, start_server, AppState};
use tokio::signal;

use crate::config::ServerConfig;

/// Radiocast Server - one never-ending Ogg/Opus stream from a rotating playlist.
#[derive(Parser, Debug)]
#[command(name = "radiocast-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "RADIOCAST_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "RADIOCAST_BIND_PORT")]
    port: Option<u16>,

    /// ffmpeg executable (overrides config file).
    #[arg(long, env = "RADIOCAST_FFMPEG")]
    ffmpeg: Option<String>,

    /// Track played when nothing else is queued (overrides config file).
    #[arg(long, env = "RADIOCAST_FALLBACK_TRACK")]
    fallback_track: Option<String>,

    /// Tracks queued at startup, in order.
    #[arg(long = "seed", value_name = "REFERENCE")]
    seed_tracks: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Radiocast Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(ffmpeg) = args.ffmpeg {
        config.transcoder.ffmpeg_path = ffmpeg;
    }
    if let Some(track) = args.fallback_track {
        config.playback.fallback_track = track;
    }
    if !args.seed_tracks.is_empty() {
        config.playback.seed_tracks = args.seed_tracks;
    }

    log::info!(
        "Configuration: bind_port={}, ffmpeg={}, yt-dlp={}, fallback={}",
        config.bind_port,
        config.transcoder.ffmpeg_path,
        config.resolver.ytdlp_path,
        config.playback.fallback_track
    );

    let core_config = config.to_core_config();
    let services = bootstrap_services(&core_config).context("Failed to bootstrap services")?;
    log::info!("Services bootstrapped successfully");

    services.start_background_tasks();

    let app_state = AppState::new(&services);
    let shutdown = services.cancel_token.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state, shutdown).await {
            log::error!("Server error: {}", e);
        }
    });

    shutdown_signal().await;
    log::info!("Shutdown signal received, cleaning up...");

    // Cancels the token the server's graceful shutdown waits on.
    services.shutdown().await;
    if tokio::time::timeout(Duration::from_secs(5), server_handle)
        .await
        .is_err()
    {
        log::warn!("HTTP server did not stop in time");
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
