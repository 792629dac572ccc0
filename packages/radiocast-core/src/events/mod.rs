//! Playback status notifications.
//!
//! This module provides:
//! - [`EventEmitter`] trait through which the scheduler reports state changes
//! - [`EventChannel`], the single-slot push channel behind the events endpoint
//! - [`PlaybackEvent`] and its wire name [`EventType`]

mod channel;
mod emitter;

pub use channel::{EventChannel, EventSubscription, NowPlayingEvent};
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::track::TrackDescriptor;

/// Wire name of an event, used as the push frame's `event:` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    TrackStarted,
    TrackQueued,
    NowPlayingSnapshot,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TrackStarted => "trackStarted",
            Self::TrackQueued => "trackQueued",
            Self::NowPlayingSnapshot => "nowPlayingSnapshot",
        }
    }

    /// Whether a frame of this type describes what is playing right now,
    /// and is therefore replayed to newly attached subscribers.
    pub fn is_now_playing(self) -> bool {
        matches!(self, Self::TrackStarted | Self::NowPlayingSnapshot)
    }
}

/// What is playing and what comes next.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NowPlayingSnapshot {
    pub now_playing: Option<TrackDescriptor>,
    pub next_up: Option<TrackDescriptor>,
}

/// A track that was appended to the explicit queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedTrack {
    #[serde(flatten)]
    pub track: TrackDescriptor,
    /// Zero-based position in the explicit queue.
    pub position: usize,
}

/// Events emitted by the playback scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// A track was handed to the transcoder.
    TrackStarted(TrackDescriptor),
    /// A user request added a track to the queue.
    TrackQueued(QueuedTrack),
    /// Current and next track, published after every track start.
    NowPlayingSnapshot(NowPlayingSnapshot),
}

impl PlaybackEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::TrackStarted(_) => EventType::TrackStarted,
            Self::TrackQueued(_) => EventType::TrackQueued,
            Self::NowPlayingSnapshot(_) => EventType::NowPlayingSnapshot,
        }
    }

    /// JSON payload carried in the frame's `data:` field.
    pub fn payload(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Self::TrackStarted(track) => serde_json::to_value(track),
            Self::TrackQueued(queued) => serde_json::to_value(queued),
            Self::NowPlayingSnapshot(snapshot) => serde_json::to_value(snapshot),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_types_use_camel_case_names() {
        assert_eq!(
            serde_json::to_value(EventType::NowPlayingSnapshot).unwrap(),
            "nowPlayingSnapshot"
        );
        assert_eq!(EventType::TrackQueued.as_str(), "trackQueued");
        assert!(EventType::TrackStarted.is_now_playing());
        assert!(!EventType::TrackQueued.is_now_playing());
    }

    #[test]
    fn queued_payload_flattens_track_and_position() {
        let event = PlaybackEvent::TrackQueued(QueuedTrack {
            track: TrackDescriptor::unresolved("ytsearch1:song"),
            position: 3,
        });
        let payload = event.payload().unwrap();
        assert_eq!(payload["position"], 3);
        assert_eq!(payload["reference"], "ytsearch1:song");
        assert_eq!(event.event_type(), EventType::TrackQueued);
    }

    #[test]
    fn snapshot_payload_uses_snake_case_keys() {
        let event = PlaybackEvent::NowPlayingSnapshot(NowPlayingSnapshot {
            now_playing: Some(TrackDescriptor::unresolved("a")),
            next_up: None,
        });
        let payload = event.payload().unwrap();
        assert_eq!(payload["now_playing"]["title"], "a");
        assert!(payload["next_up"].is_null());
    }
}
