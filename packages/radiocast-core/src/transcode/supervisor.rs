use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use super::{FetcherProcess, MuxerInput, MuxerProcess, TranscodeError, Transcoder};
use crate::error::ErrorCode;
use crate::state::TranscoderConfig;
use crate::stream::BroadcastBuffer;
use crate::track::ResolvedTrack;
use crate::utils::now_millis;

/// How a track's feed ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    /// The fetcher's output ended after delivering audio.
    Exhausted,
    /// The track's skip flag was raised.
    Skipped,
    /// The fetcher could not be started, failed, or produced nothing.
    Failed,
    /// No data arrived within the stall timeout.
    Stalled,
}

/// What the feed loop is doing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SupervisorState {
    Idle,
    #[serde(rename_all = "camelCase")]
    Feeding { title: String, started_at: u64 },
}

struct FeedRequest {
    track: ResolvedTrack,
    skip: CancellationToken,
    done: oneshot::Sender<FeedOutcome>,
}

/// Owns the muxer epochs and the per-track feed loop.
///
/// The muxer input lives in a slot shared by both loops: the epoch loop
/// fills it when a muxer starts and empties it when the muxer goes away,
/// and the feed loop waits for it to be filled again rather than dropping
/// the track.
pub struct TranscodeSupervisor {
    transcoder: Arc<dyn Transcoder>,
    buffer: Arc<BroadcastBuffer>,
    chunk_size: usize,
    stall_timeout: Duration,
    restart_delay: Duration,
    state: parking_lot::Mutex<SupervisorState>,
    muxer_input: tokio::sync::Mutex<Option<MuxerInput>>,
    muxer_ready: watch::Sender<bool>,
    feed_tx: mpsc::Sender<FeedRequest>,
    feed_rx: parking_lot::Mutex<Option<mpsc::Receiver<FeedRequest>>>,
}

impl TranscodeSupervisor {
    pub fn new(
        transcoder: Arc<dyn Transcoder>,
        buffer: Arc<BroadcastBuffer>,
        config: &TranscoderConfig,
    ) -> Self {
        let (feed_tx, feed_rx) = mpsc::channel(1);
        let (muxer_ready, _) = watch::channel(false);
        Self {
            transcoder,
            buffer,
            chunk_size: config.feed_chunk_size.max(1),
            stall_timeout: config.stall_timeout(),
            restart_delay: config.muxer_restart_delay(),
            state: parking_lot::Mutex::new(SupervisorState::Idle),
            muxer_input: tokio::sync::Mutex::new(None),
            muxer_ready,
            feed_tx,
            feed_rx: parking_lot::Mutex::new(Some(feed_rx)),
        }
    }

    #[must_use]
    pub fn state(&self) -> SupervisorState {
        self.state.lock().clone()
    }

    /// Returns `true` while a muxer is accepting input.
    #[must_use]
    pub fn muxer_running(&self) -> bool {
        *self.muxer_ready.borrow()
    }

    /// Hands a track to the feed loop and waits until it is done with it.
    ///
    /// Cancelling `skip` is the track's skip flag: the feed loop checks it
    /// before starting the fetcher and before every read. A flag raised
    /// before the track reaches the feed loop still applies to it.
    pub async fn play(&self, track: ResolvedTrack, skip: CancellationToken) -> FeedOutcome {
        let (done, outcome) = oneshot::channel();
        let request = FeedRequest { track, skip, done };
        if self.feed_tx.send(request).await.is_err() {
            log::warn!("[Supervisor] Feed loop is not running");
            return FeedOutcome::Failed;
        }
        outcome.await.unwrap_or(FeedOutcome::Failed)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Feed loop
    // ─────────────────────────────────────────────────────────────────────────

    /// Runs the feed loop until cancelled. Only the first call does anything.
    pub async fn run_feed_loop(self: Arc<Self>, cancel: CancellationToken) {
        let Some(mut requests) = self.feed_rx.lock().take() else {
            log::warn!("[Supervisor] Feed loop already started");
            return;
        };

        loop {
            let request = tokio::select! {
                _ = cancel.cancelled() => break,
                request = requests.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.feed(request.track, &request.skip) => outcome,
            };
            let _ = request.done.send(outcome);
        }
        log::info!("[Supervisor] Feed loop stopped");
    }

    async fn feed(&self, track: ResolvedTrack, skip: &CancellationToken) -> FeedOutcome {
        let title = track.title().to_string();
        if skip.is_cancelled() {
            log::info!("[Supervisor] Track '{}' skipped before feeding", title);
            return FeedOutcome::Skipped;
        }
        *self.state.lock() = SupervisorState::Feeding {
            title: title.clone(),
            started_at: now_millis(),
        };

        let outcome = match self.transcoder.spawn_fetcher(&track) {
            Ok(fetcher) => self.pump(fetcher, &title, skip).await,
            Err(e) => {
                log::warn!("[Supervisor] Could not start fetcher for '{}': {}", title, e);
                FeedOutcome::Failed
            }
        };

        *self.state.lock() = SupervisorState::Idle;
        self.buffer.reset_position();
        outcome
    }

    /// Copies the fetcher's output into the muxer until the track ends.
    async fn pump(
        &self,
        fetcher: FetcherProcess,
        title: &str,
        skip: &CancellationToken,
    ) -> FeedOutcome {
        let FetcherProcess { mut output, mut handle } = fetcher;
        let mut chunk = vec![0u8; self.chunk_size];
        let mut bytes_fed: u64 = 0;
        let mut draining = false;

        let outcome = loop {
            if skip.is_cancelled() {
                break FeedOutcome::Skipped;
            }

            if !draining {
                match handle.try_exit() {
                    Some(false) => break FeedOutcome::Failed,
                    // Exited cleanly: read what is left in the pipe.
                    Some(true) => draining = true,
                    None => {}
                }
            }

            let read = tokio::select! {
                biased;
                _ = skip.cancelled() => break FeedOutcome::Skipped,
                read = tokio::time::timeout(self.stall_timeout, output.read(&mut chunk)) => read,
            };
            let n = match read {
                Err(_) => break FeedOutcome::Stalled,
                Ok(Err(e)) => {
                    log::warn!("[Supervisor] Fetcher read failed for '{}': {}", title, e);
                    break FeedOutcome::Failed;
                }
                Ok(Ok(0)) => break FeedOutcome::Exhausted,
                Ok(Ok(n)) => n,
            };

            if let Err(outcome) = self.forward(&chunk[..n], skip, title).await {
                break outcome;
            }
            bytes_fed += n as u64;
        };

        // The skipped or finished fetcher is never reused.
        handle.release().await;

        let outcome = if outcome == FeedOutcome::Exhausted && bytes_fed == 0 {
            FeedOutcome::Failed
        } else {
            outcome
        };
        match outcome {
            FeedOutcome::Exhausted | FeedOutcome::Skipped => log::info!(
                "[Supervisor] Track '{}' {:?} after {} bytes",
                title,
                outcome,
                bytes_fed
            ),
            FeedOutcome::Failed | FeedOutcome::Stalled => log::warn!(
                "[Supervisor] Track '{}' {:?} after {} bytes",
                title,
                outcome,
                bytes_fed
            ),
        }
        outcome
    }

    /// Writes one chunk into the muxer, waiting for a muxer to come back if
    /// the current one went away.
    async fn forward(
        &self,
        chunk: &[u8],
        skip: &CancellationToken,
        title: &str,
    ) -> Result<(), FeedOutcome> {
        loop {
            {
                let mut slot = self.muxer_input.lock().await;
                if let Some(input) = slot.as_mut() {
                    match input.write_all(chunk).await {
                        Ok(()) => return Ok(()),
                        Err(e) => {
                            log::warn!("[Supervisor] Muxer input closed: {}", e);
                            *slot = None;
                            self.muxer_ready.send_replace(false);
                        }
                    }
                }
            }

            let mut ready = self.muxer_ready.subscribe();
            tokio::select! {
                biased;
                _ = skip.cancelled() => return Err(FeedOutcome::Skipped),
                ready = tokio::time::timeout(self.stall_timeout, ready.wait_for(|r| *r)) => {
                    if !matches!(ready, Ok(Ok(_))) {
                        log::warn!(
                            "[Supervisor] {} while feeding '{}'",
                            TranscodeError::MuxerUnavailable,
                            title
                        );
                        return Err(FeedOutcome::Stalled);
                    }
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Muxer epochs
    // ─────────────────────────────────────────────────────────────────────────

    /// Keeps a muxer running until cancelled, one stream epoch per process.
    ///
    /// When a muxer's output ends or loses sync the epoch is torn down:
    /// its process is killed and reaped, listeners see end of stream, and a
    /// fresh muxer with a fresh header follows after the restart delay.
    pub async fn run_muxer_epochs(self: Arc<Self>, cancel: CancellationToken) {
        log::info!(
            "[Supervisor] Muxer supervision started ({})",
            self.transcoder.description()
        );
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match self.transcoder.spawn_muxer() {
                Ok(muxer) => self.run_epoch(muxer, &cancel).await,
                Err(e) => log::error!("[Supervisor] Failed to start muxer: {}", e),
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.restart_delay) => {}
            }
        }
        log::info!("[Supervisor] Muxer supervision stopped");
    }

    async fn run_epoch(&self, muxer: MuxerProcess, cancel: &CancellationToken) {
        let MuxerProcess {
            input,
            output,
            handle,
        } = muxer;
        let epoch = self.buffer.begin_epoch();
        *self.muxer_input.lock().await = Some(input);
        self.muxer_ready.send_replace(true);

        let result = tokio::select! {
            _ = cancel.cancelled() => None,
            result = self.buffer.run_demux(&epoch, output) => Some(result),
        };
        match result {
            Some(Ok(pages)) => log::warn!(
                "[Supervisor] Muxer output ended after {} pages, restarting epoch {}",
                pages,
                epoch.id()
            ),
            Some(Err(e)) => log::warn!(
                "[Supervisor] Epoch {} torn down: {} ({})",
                epoch.id(),
                e,
                e.code()
            ),
            None => log::info!("[Supervisor] Shutting down epoch {}", epoch.id()),
        }

        self.muxer_ready.send_replace(false);
        // Kill before taking the input so a write blocked on a full pipe fails.
        handle.release().await;
        self.muxer_input.lock().await.take();
        self.buffer.end_epoch();
    }
}
