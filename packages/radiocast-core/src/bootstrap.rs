//! Application bootstrap and dependency wiring.
//!
//! This module is the composition root: the single place where all services
//! are instantiated and wired together, and where the long-lived workers are
//! started and stopped.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{RadioError, RadioResult};
use crate::events::{EventChannel, EventEmitter};
use crate::resolver::{MediaResolver, YtDlpResolver};
use crate::runtime::TokioSpawner;
use crate::scheduler::{PlaybackScheduler, TrackSink};
use crate::state::Config;
use crate::stream::BroadcastBuffer;
use crate::transcode::{FfmpegTranscoder, TranscodeSupervisor, Transcoder};

/// How long shutdown waits for workers to wind down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Container for all bootstrapped services.
pub struct BootstrappedServices {
    /// Latest header and media unit of the live stream.
    pub buffer: Arc<BroadcastBuffer>,
    /// Muxer epochs and the per-track feed loop.
    pub supervisor: Arc<TranscodeSupervisor>,
    /// Queue ownership and track selection.
    pub scheduler: Arc<PlaybackScheduler>,
    /// Status events for the events endpoint.
    pub events: Arc<EventChannel>,
    /// Spawner for add/skip workers.
    pub spawner: TokioSpawner,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
    config: Arc<Config>,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl BootstrappedServices {
    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Starts the long-lived workers: muxer epochs, feed loop, event
    /// dispatcher and scheduler.
    ///
    /// Calling it again while they run does nothing.
    pub fn start_background_tasks(&self) {
        let mut workers = self.workers.lock();
        if !workers.is_empty() {
            log::warn!("[Bootstrap] Background tasks already started");
            return;
        }

        let cancel = &self.cancel_token;
        workers.push(tokio::spawn(
            Arc::clone(&self.supervisor).run_muxer_epochs(cancel.clone()),
        ));
        workers.push(tokio::spawn(
            Arc::clone(&self.supervisor).run_feed_loop(cancel.clone()),
        ));
        workers.push(tokio::spawn(
            Arc::clone(&self.events).run_dispatcher(cancel.clone()),
        ));
        workers.push(tokio::spawn(
            Arc::clone(&self.scheduler).run(cancel.clone()),
        ));
        log::info!("[Bootstrap] Started {} background tasks", workers.len());
    }

    /// Initiates graceful shutdown of all services.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");
        self.cancel_token.cancel();

        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for worker in workers {
            match tokio::time::timeout(SHUTDOWN_GRACE, worker).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("[Bootstrap] Worker failed: {}", e),
                Err(_) => log::warn!("[Bootstrap] Worker did not stop in time"),
            }
        }
        if !self.spawner.drain(SHUTDOWN_GRACE).await {
            log::warn!(
                "[Bootstrap] {} request workers still running",
                self.spawner.in_flight()
            );
        }

        self.buffer.end_epoch();
        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Creates the HTTP client used for related-track lookups.
fn create_http_client(timeout: Duration) -> RadioResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RadioError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Bootstraps all services with the production transcoder and resolver.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the HTTP client
/// cannot be built.
pub fn bootstrap_services(config: &Config) -> RadioResult<BootstrappedServices> {
    let http_client = create_http_client(config.resolver.request_timeout())?;
    let resolver = Arc::new(YtDlpResolver::new(
        config.resolver.clone(),
        config.playback.max_track_duration_secs,
        http_client,
    ));
    let transcoder = Arc::new(FfmpegTranscoder::new(config.transcoder.clone()));

    bootstrap_with(config, transcoder, resolver)
}

/// Wires services around the given transcoder and resolver.
///
/// Creation order follows the dependencies:
///
/// 1. Broadcast buffer and event channel (no dependencies)
/// 2. Transcode supervisor (transcoder, buffer)
/// 3. Playback scheduler (resolver, supervisor, event channel, spawner)
///
/// # Errors
///
/// Returns an error if the configuration is invalid.
pub fn bootstrap_with(
    config: &Config,
    transcoder: Arc<dyn Transcoder>,
    resolver: Arc<dyn MediaResolver>,
) -> RadioResult<BootstrappedServices> {
    config.validate().map_err(RadioError::Configuration)?;

    let spawner = TokioSpawner::current();
    let cancel_token = CancellationToken::new();

    let buffer = Arc::new(BroadcastBuffer::new());
    let events = Arc::new(EventChannel::new(config.event_channel_capacity));

    log::info!(
        "[Bootstrap] Using {} transcoder",
        transcoder.description()
    );
    let supervisor = Arc::new(TranscodeSupervisor::new(
        transcoder,
        Arc::clone(&buffer),
        &config.transcoder,
    ));

    let scheduler = Arc::new(PlaybackScheduler::new(
        resolver,
        Arc::clone(&supervisor) as Arc<dyn TrackSink>,
        Arc::clone(&events) as Arc<dyn EventEmitter>,
        spawner.clone(),
        config.playback.clone(),
    ));

    Ok(BootstrappedServices {
        buffer,
        supervisor,
        scheduler,
        events,
        spawner,
        cancel_token,
        config: Arc::new(config.clone()),
        workers: parking_lot::Mutex::new(Vec::new()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::TranscoderConfig;

    #[test]
    fn http_client_builds_with_timeout() {
        let client = create_http_client(Duration::from_secs(1)).unwrap();
        assert!(client.get("http://example.com").build().is_ok());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let mut config = Config::default();
        config.transcoder.feed_chunk_size = 0;
        match bootstrap_services(&config) {
            Err(RadioError::Configuration(msg)) => assert!(msg.contains("feed_chunk_size")),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("invalid config accepted"),
        }
    }

    #[tokio::test]
    async fn services_start_and_shut_down_without_ffmpeg() {
        let mut config = Config::default();
        config.transcoder = TranscoderConfig {
            ffmpeg_path: "/nonexistent/radiocast-ffmpeg".into(),
            muxer_restart_delay_ms: 10,
            ..TranscoderConfig::default()
        };
        config.resolver.ytdlp_path = "/nonexistent/radiocast-yt-dlp".into();
        config.playback.seed_tracks = vec!["ytsearch1:seed".into()];

        let services = bootstrap_services(&config).unwrap();
        assert_eq!(services.scheduler.queue_len(), 1);

        services.start_background_tasks();
        services.start_background_tasks();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!services.supervisor.muxer_running());

        tokio::time::timeout(Duration::from_secs(10), services.shutdown())
            .await
            .unwrap();
        assert!(services.cancel_token.is_cancelled());
        assert!(services.buffer.subscribe().is_none());
    }
}
