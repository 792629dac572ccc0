//! Track selection and handoff to the transcoder.
//!
//! [`PlaybackScheduler`] owns the explicit queue and the auto-queue. Its run
//! loop pops a candidate, resolves it if needed, hands it to a [`TrackSink`]
//! and waits for the sink to finish with it, forever.
//!
//! Each pass of the run loop is a turn with its own skip token. A skip
//! cancels the token of the turn it was requested in, so it ends that
//! turn's track whether the track is still resolving or already playing,
//! and never carries over to a later track.

mod queue;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{ErrorCode, RadioError, RadioResult};
use crate::events::{EventEmitter, NowPlayingSnapshot, PlaybackEvent, QueuedTrack};
use crate::resolver::MediaResolver;
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::state::PlaybackConfig;
use crate::track::{ResolvedTrack, TrackDescriptor};
use crate::transcode::{FeedOutcome, TranscodeSupervisor};

use queue::QueueState;

/// Consecutive unusable tracks after which the run loop starts pausing
/// between attempts.
const FAILURE_BACKOFF_THRESHOLD: u32 = 3;

/// Pause between attempts once the threshold above is reached.
const FAILURE_BACKOFF: Duration = Duration::from_secs(2);

/// Where the scheduler sends resolved tracks.
#[async_trait]
pub trait TrackSink: Send + Sync {
    /// Plays `track` to the end, or until `skip` is cancelled, and reports
    /// how it ended. A token cancelled before the call skips the track
    /// without playing it.
    async fn play(&self, track: ResolvedTrack, skip: CancellationToken) -> FeedOutcome;
}

#[async_trait]
impl TrackSink for TranscodeSupervisor {
    async fn play(&self, track: ResolvedTrack, skip: CancellationToken) -> FeedOutcome {
        TranscodeSupervisor::play(self, track, skip).await
    }
}

/// Decides what plays next and drives resolution and handoff.
pub struct PlaybackScheduler {
    resolver: Arc<dyn MediaResolver>,
    sink: Arc<dyn TrackSink>,
    emitter: Arc<dyn EventEmitter>,
    spawner: TokioSpawner,
    config: PlaybackConfig,
    state: parking_lot::Mutex<QueueState>,
    /// Skip token of the run loop's current turn.
    turn: parking_lot::Mutex<CancellationToken>,
    /// Held for the duration of a related-tracks lookup.
    refill: tokio::sync::Mutex<()>,
}

impl PlaybackScheduler {
    /// Creates a scheduler with the configured seed tracks already queued.
    pub fn new(
        resolver: Arc<dyn MediaResolver>,
        sink: Arc<dyn TrackSink>,
        emitter: Arc<dyn EventEmitter>,
        spawner: TokioSpawner,
        config: PlaybackConfig,
    ) -> Self {
        let mut state = QueueState::default();
        for reference in &config.seed_tracks {
            state.push(TrackDescriptor::unresolved(reference.as_str()));
        }
        if !config.seed_tracks.is_empty() {
            log::info!("[Scheduler] Queued {} seed tracks", config.seed_tracks.len());
        }

        Self {
            resolver,
            sink,
            emitter,
            spawner,
            config,
            state: parking_lot::Mutex::new(state),
            turn: parking_lot::Mutex::new(CancellationToken::new()),
            refill: tokio::sync::Mutex::new(()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Control operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolves `reference` fully and appends it to the explicit queue.
    ///
    /// Resolution runs in the caller's task, never on the run loop.
    pub async fn add_track(&self, reference: &str) -> RadioResult<QueuedTrack> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(RadioError::InvalidRequest("missing `url` argument".into()));
        }

        let track = self.resolver.resolve(reference, true).await.map_err(|e| {
            log::debug!("[Scheduler] Could not add {}: {} ({})", reference, e, e.code());
            RadioError::from(e)
        })?;
        if track.exceeds_duration(self.config.max_track_duration_secs) {
            return Err(RadioError::ResolveFailed(format!(
                "track is {:.0}s long, limit is {:.0}s",
                track.duration, self.config.max_track_duration_secs
            )));
        }

        let position = self.state.lock().push(track.clone());
        log::info!("[Scheduler] Queued '{}' at position {}", track.title, position);

        let queued = QueuedTrack { track, position };
        self.emitter.emit(PlaybackEvent::TrackQueued(queued.clone()));
        Ok(queued)
    }

    /// Appends every playable entry of a playlist, unresolved.
    ///
    /// Returns the number of tracks queued.
    pub async fn add_playlist(&self, reference: &str) -> RadioResult<usize> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(RadioError::InvalidRequest("missing `url` argument".into()));
        }

        let entries = self.resolver.list_playlist(reference).await?;
        let max = self.config.max_track_duration_secs;
        let mut queued = Vec::with_capacity(entries.len());
        {
            let mut state = self.state.lock();
            for track in entries.into_iter().filter(|t| !t.exceeds_duration(max)) {
                let position = state.push(track.clone());
                queued.push(QueuedTrack { track, position });
            }
        }

        log::info!(
            "[Scheduler] Queued {} tracks from playlist {}",
            queued.len(),
            reference
        );
        let count = queued.len();
        for entry in queued {
            self.emitter.emit(PlaybackEvent::TrackQueued(entry));
        }
        Ok(count)
    }

    /// Moves on to the next track without blocking the caller.
    ///
    /// A worker pops the next track out of band, puts it in front of the
    /// explicit queue and then raises the skip flag of the current turn.
    pub fn skip(self: &Arc<Self>) {
        let turn = self.turn.lock().clone();
        let scheduler = Arc::clone(self);
        self.spawner.spawn(async move {
            let next = scheduler.pop().await;
            log::info!("[Scheduler] Skipping to '{}'", next.title);
            scheduler.state.lock().push_front(next);
            turn.cancel();
        });
    }

    /// A window of the explicit queue.
    #[must_use]
    pub fn current_queue(&self, offset: usize, limit: usize) -> Vec<TrackDescriptor> {
        self.state.lock().page(offset, limit)
    }

    /// Page `page` of the explicit queue, using the configured page size.
    #[must_use]
    pub fn queue_page(&self, page: usize) -> Vec<TrackDescriptor> {
        let size = self.config.queue_page_size;
        self.current_queue(page.saturating_mul(size), size)
    }

    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.state.lock().len()
    }

    /// Snapshot of the auto-queue.
    #[must_use]
    pub fn auto_queue(&self) -> Vec<TrackDescriptor> {
        self.state.lock().auto_queue()
    }

    #[must_use]
    pub fn now_playing(&self) -> Option<TrackDescriptor> {
        self.state.lock().now_playing().cloned()
    }

    /// What is playing and the explicit queue's front.
    #[must_use]
    pub fn snapshot(&self) -> NowPlayingSnapshot {
        let state = self.state.lock();
        NowPlayingSnapshot {
            now_playing: state.now_playing().cloned(),
            next_up: state.next_up().cloned(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Selection
    // ─────────────────────────────────────────────────────────────────────────

    /// Picks the next candidate.
    ///
    /// Explicit requests come first. With both queues empty the auto-queue
    /// is refilled with one related-tracks lookup, and if that yields
    /// nothing the pinned fallback track is returned.
    ///
    /// Only one lookup runs at a time; a concurrent pop waits for it and
    /// takes from the batch it produced.
    pub async fn pop(&self) -> TrackDescriptor {
        let popped = self.state.lock().pop();
        if let Some(track) = popped {
            return track;
        }

        let _refill = self.refill.lock().await;
        let seed = {
            let mut state = self.state.lock();
            if let Some(track) = state.pop() {
                return track;
            }
            state.related_seed()
        };

        if let Some(seed) = seed {
            let related = self
                .resolver
                .related_tracks(&seed, self.config.related_batch_size)
                .await;
            log::debug!(
                "[Scheduler] {} related tracks for '{}'",
                related.len(),
                seed.title
            );
            if let Some(track) = self.state.lock().refill_and_pop(related) {
                return track;
            }
        }

        log::info!("[Scheduler] Nothing queued, using fallback track");
        TrackDescriptor::unresolved(self.config.fallback_track.as_str())
    }

    /// Turns a candidate into something the sink can play.
    ///
    /// Candidates that are not fully resolved are re-resolved from their
    /// canonical URL. Over-length tracks and resolution failures yield
    /// `None`.
    pub async fn prepare(&self, candidate: TrackDescriptor) -> Option<ResolvedTrack> {
        let max = self.config.max_track_duration_secs;
        if candidate.exceeds_duration(max) {
            log::debug!(
                "[Scheduler] Skipping '{}': {:.0}s is over the limit",
                candidate.title,
                candidate.duration
            );
            return None;
        }

        let candidate = match candidate.into_resolved() {
            Ok(track) => return Some(track),
            Err(candidate) => candidate,
        };

        let resolved = match self
            .resolver
            .resolve(candidate.resolution_input(), true)
            .await
        {
            Ok(resolved) => resolved,
            Err(e) => {
                log::debug!(
                    "[Scheduler] Skipping '{}': {} ({})",
                    candidate.title,
                    e,
                    e.code()
                );
                return None;
            }
        };
        if resolved.exceeds_duration(max) {
            log::debug!(
                "[Scheduler] Skipping '{}': {:.0}s is over the limit",
                resolved.title,
                resolved.duration
            );
            return None;
        }
        match resolved.into_resolved() {
            Ok(track) => Some(track),
            Err(track) => {
                log::debug!("[Scheduler] Skipping '{}': no media URL", track.title);
                None
            }
        }
    }

    fn announce(&self, track: &ResolvedTrack) {
        let snapshot = {
            let mut state = self.state.lock();
            state.set_now_playing(track.descriptor().clone());
            NowPlayingSnapshot {
                now_playing: state.now_playing().cloned(),
                next_up: state.next_up().cloned(),
            }
        };
        log::info!("[Scheduler] Playing '{}'", track.title());
        self.emitter
            .emit(PlaybackEvent::TrackStarted(track.descriptor().clone()));
        self.emitter.emit(PlaybackEvent::NowPlayingSnapshot(snapshot));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Run loop
    // ─────────────────────────────────────────────────────────────────────────

    /// Selects and plays tracks until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        log::info!("[Scheduler] Started");
        let mut failures: u32 = 0;

        loop {
            if failures >= FAILURE_BACKOFF_THRESHOLD {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(FAILURE_BACKOFF) => {}
                }
            }

            let turn = cancel.child_token();
            *self.turn.lock() = turn.clone();

            let candidate = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                candidate = self.pop() => candidate,
            };
            let title = candidate.title.clone();
            let prepared = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = turn.cancelled() => {
                    log::debug!("[Scheduler] '{}' skipped while resolving", title);
                    failures = 0;
                    continue;
                }
                prepared = self.prepare(candidate) => prepared,
            };
            let Some(track) = prepared else {
                failures = failures.saturating_add(1);
                continue;
            };
            if turn.is_cancelled() {
                log::debug!("[Scheduler] '{}' skipped before playback", track.title());
                failures = 0;
                continue;
            }

            self.announce(&track);
            let title = track.title().to_string();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.sink.play(track, turn) => outcome,
            };
            log::debug!("[Scheduler] '{}' ended: {:?}", title, outcome);

            failures = match outcome {
                FeedOutcome::Exhausted | FeedOutcome::Skipped => 0,
                FeedOutcome::Failed | FeedOutcome::Stalled => failures.saturating_add(1),
            };
        }
        log::info!("[Scheduler] Stopped");
    }
}
