use std::sync::Arc;

use async_stream::stream;
use bytes::Bytes;
use futures::Stream;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::{EventEmitter, EventType, PlaybackEvent};

/// The latest formatted push frame.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlayingEvent {
    pub event_type: EventType,
    /// `event: <type>\ndata: <json>\n\n`
    pub frame: Bytes,
}

#[derive(Debug, Default)]
struct EventSlot {
    current: Option<NowPlayingEvent>,
    /// Last frame describing the playing track, replayed on attach.
    now_playing: Option<Bytes>,
    /// Set once the dispatcher has stopped; subscriptions end.
    closed: bool,
}

/// Single-slot status broadcast.
///
/// [`publish`](Self::publish) only enqueues; one dispatcher task formats
/// events into push frames and stores each as the current value, waking all
/// subscribers. Delivery is latest-value: a subscriber that is slow to read
/// sees only the newest frame.
pub struct EventChannel {
    tx: mpsc::Sender<PlaybackEvent>,
    rx: parking_lot::Mutex<Option<mpsc::Receiver<PlaybackEvent>>>,
    slot: watch::Sender<EventSlot>,
}

impl EventChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (slot, _) = watch::channel(EventSlot::default());
        Self {
            tx,
            rx: parking_lot::Mutex::new(Some(rx)),
            slot,
        }
    }

    /// Enqueues an event for the dispatcher. Never blocks; when the queue
    /// is full the event is dropped.
    pub fn publish(&self, event: PlaybackEvent) {
        if let Err(e) = self.tx.try_send(event) {
            log::warn!("[Events] Dropping event: {}", e);
        }
    }

    /// Formats one event into push-event framing.
    pub fn format_frame(event: &PlaybackEvent) -> serde_json::Result<Bytes> {
        let data = serde_json::to_string(&event.payload()?)?;
        Ok(Bytes::from(format!(
            "event: {}\ndata: {}\n\n",
            event.event_type().as_str(),
            data
        )))
    }

    /// Runs the dispatcher until cancelled. Only the first call does anything.
    ///
    /// When it stops, every subscription ends.
    pub async fn run_dispatcher(self: Arc<Self>, cancel: CancellationToken) {
        let Some(mut rx) = self.rx.lock().take() else {
            log::warn!("[Events] Dispatcher already started");
            return;
        };
        log::debug!("[Events] Dispatcher started");

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.dispatch(&event);
        }
        self.slot.send_modify(|slot| slot.closed = true);
        log::debug!("[Events] Dispatcher stopped");
    }

    fn dispatch(&self, event: &PlaybackEvent) {
        let frame = match Self::format_frame(event) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("[Events] Could not encode {:?}: {}", event.event_type(), e);
                return;
            }
        };
        let event_type = event.event_type();
        self.slot.send_modify(|slot| {
            if event_type.is_now_playing() {
                slot.now_playing = Some(frame.clone());
            }
            slot.current = Some(NowPlayingEvent { event_type, frame });
        });
    }

    /// Attaches a subscriber.
    pub fn subscribe(&self) -> EventSubscription {
        let mut rx = self.slot.subscribe();
        let initial = {
            let slot = rx.borrow_and_update();
            if slot.closed {
                None
            } else {
                slot.now_playing.clone()
            }
        };
        EventSubscription { initial, rx }
    }

    /// Latest frame of any type.
    pub fn current(&self) -> Option<NowPlayingEvent> {
        self.slot.borrow().current.clone()
    }
}

impl EventEmitter for EventChannel {
    fn emit(&self, event: PlaybackEvent) {
        self.publish(event);
    }
}

/// One subscriber's view of the channel.
pub struct EventSubscription {
    initial: Option<Bytes>,
    rx: watch::Receiver<EventSlot>,
}

impl EventSubscription {
    /// The now-playing frame to send on attach, if any.
    pub fn initial(&self) -> Option<&Bytes> {
        self.initial.as_ref()
    }

    /// Waits for the next frame. Returns `None` once the dispatcher has
    /// stopped or the channel is gone.
    pub async fn next_frame(&mut self) -> Option<Bytes> {
        if self.rx.borrow().closed {
            return None;
        }
        loop {
            self.rx.changed().await.ok()?;
            let slot = self.rx.borrow_and_update();
            if slot.closed {
                return None;
            }
            if let Some(current) = slot.current.as_ref() {
                return Some(current.frame.clone());
            }
        }
    }

    /// The initial frame (if any) followed by one frame per state change.
    pub fn into_stream(mut self) -> impl Stream<Item = Bytes> + Send {
        stream! {
            if let Some(initial) = self.initial.take() {
                yield initial;
            }
            while let Some(frame) = self.next_frame().await {
                yield frame;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{NowPlayingSnapshot, QueuedTrack};
    use crate::track::TrackDescriptor;
    use futures::StreamExt;
    use std::time::Duration;

    fn started(title: &str) -> PlaybackEvent {
        PlaybackEvent::TrackStarted(TrackDescriptor::unresolved(title))
    }

    fn queued(title: &str) -> PlaybackEvent {
        PlaybackEvent::TrackQueued(QueuedTrack {
            track: TrackDescriptor::unresolved(title),
            position: 0,
        })
    }

    fn running_channel() -> (Arc<EventChannel>, CancellationToken) {
        let channel = Arc::new(EventChannel::new(16));
        let cancel = CancellationToken::new();
        tokio::spawn(Arc::clone(&channel).run_dispatcher(cancel.clone()));
        (channel, cancel)
    }

    async fn wait_for_current(channel: &EventChannel, event_type: EventType) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while channel.current().map(|e| e.event_type) != Some(event_type) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[test]
    fn frame_uses_push_event_framing() {
        let frame = EventChannel::format_frame(&started("song")).unwrap();
        let text = std::str::from_utf8(&frame).unwrap();
        assert!(text.starts_with("event: trackStarted\ndata: {"));
        assert!(text.ends_with("}\n\n"));
        assert!(text.contains("\"title\":\"song\""));
    }

    #[tokio::test]
    async fn new_subscriber_gets_now_playing_immediately() {
        let (channel, cancel) = running_channel();
        assert!(channel.subscribe().initial().is_none());

        channel.publish(started("a"));
        channel.publish(queued("b"));
        wait_for_current(&channel, EventType::TrackQueued).await;

        // The current slot holds the queued event, but the replayed frame is
        // still the now-playing one.
        let subscription = channel.subscribe();
        let initial = subscription.initial().unwrap();
        assert!(initial.starts_with(b"event: trackStarted\n"));
        cancel.cancel();
    }

    #[tokio::test]
    async fn subscribers_receive_each_later_frame() {
        let (channel, cancel) = running_channel();
        let mut first = channel.subscribe();
        let mut second = channel.subscribe();

        channel.publish(PlaybackEvent::NowPlayingSnapshot(NowPlayingSnapshot::default()));
        for subscription in [&mut first, &mut second] {
            let frame = subscription.next_frame().await.unwrap();
            assert!(frame.starts_with(b"event: nowPlayingSnapshot\n"));
        }

        channel.publish(queued("c"));
        let frame = first.next_frame().await.unwrap();
        assert!(frame.starts_with(b"event: trackQueued\n"));
        cancel.cancel();
    }

    #[tokio::test]
    async fn stream_ends_when_channel_is_dropped() {
        let channel = EventChannel::new(4);
        channel.dispatch(&started("a"));
        let stream = channel.subscribe().into_stream();
        drop(channel);

        let frames: Vec<Bytes> = stream.collect().await;
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with(b"event: trackStarted\n"));
    }

    #[tokio::test]
    async fn subscriptions_end_when_dispatcher_stops() {
        let (channel, cancel) = running_channel();
        channel.publish(started("a"));
        wait_for_current(&channel, EventType::TrackStarted).await;

        let attached = channel.subscribe().into_stream();
        cancel.cancel();

        // The channel itself stays alive, as it does in the HTTP state.
        let frames: Vec<Bytes> = tokio::time::timeout(Duration::from_secs(2), attached.collect())
            .await
            .unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with(b"event: trackStarted\n"));

        let mut late = channel.subscribe();
        assert!(late.initial().is_none());
        assert!(tokio::time::timeout(Duration::from_secs(2), late.next_frame())
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn publish_without_dispatcher_drops_when_full() {
        let channel = EventChannel::new(1);
        channel.publish(started("a"));
        channel.publish(started("b"));
        assert!(channel.current().is_none());
    }
}
