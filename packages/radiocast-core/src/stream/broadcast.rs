use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_stream::stream;
use bytes::{Bytes, BytesMut};
use futures::Stream;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio::sync::watch;

use crate::ogg::{DemuxError, OggPageReader, PageKind};
use crate::utils::now_millis;

/// One muxer process lifetime.
///
/// Holds the only senders of the header and unit slots. When the last
/// reference goes away the slots close and every listener's stream ends.
pub struct StreamEpoch {
    id: u64,
    started_at: u64,
    header: watch::Sender<Bytes>,
    unit: watch::Sender<Bytes>,
}

impl StreamEpoch {
    fn new(id: u64) -> Self {
        let (header, _) = watch::channel(Bytes::new());
        let (unit, _) = watch::channel(Bytes::new());
        Self {
            id,
            started_at: now_millis(),
            header,
            unit,
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Appends a header page. The slot holds an immutable snapshot, so
    /// readers never see a half-written header.
    fn append_header(&self, page: &[u8]) {
        self.header.send_modify(|current| {
            let mut grown = BytesMut::with_capacity(current.len() + page.len());
            grown.extend_from_slice(current);
            grown.extend_from_slice(page);
            *current = grown.freeze();
        });
    }

    fn publish_unit(&self, unit: Bytes) {
        self.unit.send_replace(unit);
    }

    fn header_len(&self) -> usize {
        self.header.borrow().len()
    }

    fn listener_count(&self) -> usize {
        self.unit.receiver_count()
    }
}

/// Diagnostics snapshot for the health endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastStats {
    pub live: bool,
    pub epoch: Option<u64>,
    pub epoch_started_at: Option<u64>,
    pub header_bytes: usize,
    pub listeners: usize,
    /// Units published since the current track started.
    pub position: u64,
    /// Units published since startup.
    pub published_total: u64,
}

/// Latest-value fan-out of the muxer's demuxed output.
///
/// Exactly one media unit is held at a time. Each publish overwrites it and
/// wakes every waiting listener; a listener that is too slow to read a unit
/// before the next publish never sees it. Memory stays bounded no matter how
/// many listeners are attached or how long they stay.
pub struct BroadcastBuffer {
    current: RwLock<Option<Arc<StreamEpoch>>>,
    epochs_started: AtomicU64,
    position: AtomicU64,
    published_total: AtomicU64,
}

impl Default for BroadcastBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastBuffer {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
            epochs_started: AtomicU64::new(0),
            position: AtomicU64::new(0),
            published_total: AtomicU64::new(0),
        }
    }

    /// Starts a new stream epoch with an empty header, replacing any
    /// previous one.
    pub fn begin_epoch(&self) -> Arc<StreamEpoch> {
        let id = self.epochs_started.fetch_add(1, Ordering::Relaxed) + 1;
        let epoch = Arc::new(StreamEpoch::new(id));
        *self.current.write() = Some(Arc::clone(&epoch));
        log::info!("[Stream] Epoch {} started", id);
        epoch
    }

    /// Detaches the live epoch. Its listeners see end of stream once the
    /// demux loop lets go of it as well.
    pub fn end_epoch(&self) {
        if let Some(epoch) = self.current.write().take() {
            log::info!(
                "[Stream] Epoch {} ended with {} listener(s) attached",
                epoch.id,
                epoch.listener_count()
            );
        }
    }

    /// Attaches a new listener to the live epoch, or `None` if no muxer is
    /// running.
    pub fn subscribe(&self) -> Option<Listener> {
        let current = self.current.read();
        let epoch = current.as_ref()?;
        Some(Listener {
            epoch: epoch.id,
            header: epoch.header.subscribe(),
            unit: epoch.unit.subscribe(),
        })
    }

    /// Units published since the last [`reset_position`](Self::reset_position).
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    /// Called by the supervisor at every track boundary.
    pub fn reset_position(&self) {
        self.position.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> BroadcastStats {
        let current = self.current.read();
        BroadcastStats {
            live: current.is_some(),
            epoch: current.as_ref().map(|e| e.id),
            epoch_started_at: current.as_ref().map(|e| e.started_at),
            header_bytes: current.as_ref().map_or(0, |e| e.header_len()),
            listeners: current.as_ref().map_or(0, |e| e.listener_count()),
            position: self.position(),
            published_total: self.published_total.load(Ordering::Relaxed),
        }
    }

    /// Demuxes `output` into `epoch` until it ends.
    ///
    /// Header pages are appended to the epoch's header; every other page is
    /// published as one media unit, in the order the muxer wrote them.
    /// Returns the number of pages read when the output ends, or the demux
    /// error that killed the epoch.
    pub async fn run_demux<R>(&self, epoch: &StreamEpoch, output: R) -> Result<u64, DemuxError>
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = OggPageReader::new(output);
        // Header pages are committed together, right before the first media
        // page that follows them, so a listener never gets half a header.
        let mut pending_header = BytesMut::new();
        while let Some(page) = reader.next_page().await? {
            match page.kind() {
                PageKind::Header => {
                    log::debug!(
                        "[Stream] Epoch {} header page seq={} ({} bytes)",
                        epoch.id,
                        page.sequence(),
                        page.len()
                    );
                    pending_header.extend_from_slice(&page.to_bytes());
                }
                PageKind::Media => {
                    if !pending_header.is_empty() {
                        epoch.append_header(&pending_header.split());
                    }
                    epoch.publish_unit(page.to_bytes());
                    self.position.fetch_add(1, Ordering::Relaxed);
                    self.published_total.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        Ok(reader.pages_read())
    }
}

/// One reader's view of a stream epoch.
pub struct Listener {
    epoch: u64,
    header: watch::Receiver<Bytes>,
    unit: watch::Receiver<Bytes>,
}

impl Listener {
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Waits until the epoch's header is available and returns it.
    ///
    /// Returns `None` if the epoch ended first.
    pub async fn await_header(&mut self) -> Option<Bytes> {
        let header = self.header.wait_for(|h| !h.is_empty()).await.ok()?;
        Some(header.clone())
    }

    /// Waits for the next publish. Returns `false` once the epoch has ended.
    pub async fn await_next_unit(&mut self) -> bool {
        self.unit.changed().await.is_ok()
    }

    /// Snapshot of the unit slot, marking it as seen.
    pub fn current_unit(&mut self) -> Bytes {
        self.unit.borrow_and_update().clone()
    }

    /// Header followed by every unit this listener manages to observe.
    ///
    /// Ends when the epoch ends.
    pub fn into_stream(mut self) -> impl Stream<Item = Bytes> + Send {
        stream! {
            let Some(header) = self.await_header().await else {
                return;
            };
            yield header;
            while self.await_next_unit().await {
                yield self.current_unit();
            }
        }
    }
}
