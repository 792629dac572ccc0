//! HTTP API layer.
//!
//! Thin handlers delegating to the scheduler, the broadcast buffer and the
//! event channel. This module builds the router and runs the server.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::bootstrap::BootstrappedServices;
use crate::events::EventChannel;
use crate::protocol_constants::{PORT_RANGE_END, PORT_RANGE_START};
use crate::scheduler::PlaybackScheduler;
use crate::state::Config;
use crate::stream::BroadcastBuffer;
use crate::transcode::TranscodeSupervisor;

pub mod http;
pub mod response;
mod stream;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),

    /// No available ports in the specified range.
    #[error("No available ports in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },
}

/// Shared application state for the API layer.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<PlaybackScheduler>,
    pub buffer: Arc<BroadcastBuffer>,
    pub supervisor: Arc<TranscodeSupervisor>,
    pub events: Arc<EventChannel>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(services: &BootstrappedServices) -> Self {
        Self {
            scheduler: Arc::clone(&services.scheduler),
            buffer: Arc::clone(&services.buffer),
            supervisor: Arc::clone(&services.supervisor),
            events: Arc::clone(&services.events),
            config: services.config(),
        }
    }
}

async fn find_available_port(
    start: u16,
    end: u16,
) -> Result<(u16, tokio::net::TcpListener), ServerError> {
    for port in start..=end {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => return Ok((port, listener)),
            Err(_) => continue,
        }
    }
    Err(ServerError::NoAvailablePort { start, end })
}

/// Binds the configured port (or the first free one in the fallback range
/// when it is 0) and serves until `shutdown` is cancelled.
pub async fn start_server(state: AppState, shutdown: CancellationToken) -> Result<(), ServerError> {
    let preferred_port = state.config.preferred_port;
    let (port, listener) = if preferred_port > 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], preferred_port));
        (preferred_port, tokio::net::TcpListener::bind(&addr).await?)
    } else {
        find_available_port(PORT_RANGE_START, PORT_RANGE_END).await?
    };

    log::info!("[Server] Listening on http://0.0.0.0:{}", port);
    let app = http::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;
    log::info!("[Server] Stopped");
    Ok(())
}
