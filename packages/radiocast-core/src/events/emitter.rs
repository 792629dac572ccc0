//! Event emitter abstraction for decoupling the scheduler from transport.

use super::PlaybackEvent;

/// Trait for emitting playback events without knowledge of transport.
///
/// The scheduler holds an `Arc<dyn EventEmitter>`; in the server that is the
/// [`EventChannel`](super::EventChannel) feeding the events endpoint.
pub trait EventEmitter: Send + Sync {
    /// Emits a playback event. Must not block.
    fn emit(&self, event: PlaybackEvent);
}

/// No-op emitter for tests and embedders without a status endpoint.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit(&self, _event: PlaybackEvent) {}
}

/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit(&self, event: PlaybackEvent) {
        tracing::debug!(event_type = event.event_type().as_str(), ?event, "playback_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::TrackDescriptor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Test emitter that counts events.
    struct CountingEventEmitter {
        count: AtomicUsize,
    }

    impl EventEmitter for CountingEventEmitter {
        fn emit(&self, _event: PlaybackEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn emitters_accept_events_through_trait_objects() {
        let counting = Arc::new(CountingEventEmitter {
            count: AtomicUsize::new(0),
        });
        let emitters: Vec<Arc<dyn EventEmitter>> = vec![
            Arc::new(NoopEventEmitter),
            Arc::new(LoggingEventEmitter),
            counting.clone(),
        ];

        for emitter in &emitters {
            emitter.emit(PlaybackEvent::TrackStarted(TrackDescriptor::unresolved("a")));
        }
        assert_eq!(counting.count.load(Ordering::SeqCst), 1);
    }
}
