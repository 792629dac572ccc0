//! Track descriptors shared by the resolver, scheduler and transcoder.
//!
//! A [`TrackDescriptor`] starts life lightweight (listing metadata only) and
//! is upgraded exactly once, right before playback, into a [`ResolvedTrack`].
//! Only the latter can be handed to the transcoder, so an unresolved track
//! cannot reach the feed loop by construction.

use serde::{Deserialize, Serialize};

/// Placeholder the resolver uses for text fields the source did not supply.
pub const MISSING_FIELD: &str = "NA";

/// Metadata for one playable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackDescriptor {
    /// Opaque source identifier (URL or search query) the track was created from.
    pub reference: String,
    /// Whether a direct media URL has been obtained.
    pub resolved: bool,
    pub title: String,
    pub id: String,
    /// Stable page URL of the track, used as input for re-resolution.
    pub canonical_url: String,
    /// Length in seconds, 0 if unknown.
    pub duration: f64,
    /// Direct media URL, present only when `resolved`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    pub channel: String,
    pub channel_url: String,
    /// Name of the extractor that produced this descriptor (e.g. "youtube").
    pub extractor: String,
    /// Whether the source must be re-encoded to reach Opus at 48 kHz.
    pub need_reencode: bool,
    /// Human readable duration, filled in on full resolution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_string: Option<String>,
}

impl TrackDescriptor {
    /// Creates a bare, unresolved descriptor that only knows its reference.
    ///
    /// Used for seed tracks and the pinned fallback, which are resolved
    /// through the normal two-phase path when they are popped.
    pub fn unresolved(reference: impl Into<String>) -> Self {
        let reference = reference.into();
        Self {
            title: reference.clone(),
            canonical_url: reference.clone(),
            reference,
            resolved: false,
            id: MISSING_FIELD.to_string(),
            duration: 0.0,
            media_url: None,
            channel: MISSING_FIELD.to_string(),
            channel_url: MISSING_FIELD.to_string(),
            extractor: MISSING_FIELD.to_string(),
            need_reencode: true,
            duration_string: None,
        }
    }

    /// Returns `true` if the descriptor can be handed to the transcoder as is.
    #[must_use]
    pub fn is_playable(&self) -> bool {
        self.resolved && self.media_url.is_some()
    }

    /// Returns `true` if the known duration is over `max_secs`.
    ///
    /// Unknown durations (0) never exceed the limit.
    #[must_use]
    pub fn exceeds_duration(&self, max_secs: f64) -> bool {
        self.duration > max_secs
    }

    /// Input used when the track has to be (re-)resolved.
    ///
    /// Prefers the canonical URL, falling back to the original reference
    /// when the canonical URL is missing.
    #[must_use]
    pub fn resolution_input(&self) -> &str {
        if self.canonical_url.is_empty() || self.canonical_url == MISSING_FIELD {
            &self.reference
        } else {
            &self.canonical_url
        }
    }

    /// Upgrades into a [`ResolvedTrack`], handing the descriptor back if it
    /// is not playable.
    pub fn into_resolved(self) -> Result<ResolvedTrack, TrackDescriptor> {
        if self.is_playable() {
            Ok(ResolvedTrack(self))
        } else {
            Err(self)
        }
    }
}

/// A descriptor that is guaranteed to carry a direct media URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTrack(TrackDescriptor);

impl ResolvedTrack {
    /// Direct media URL the fetcher reads from.
    #[must_use]
    pub fn media_url(&self) -> &str {
        // Invariant upheld by `TrackDescriptor::into_resolved`.
        self.0.media_url.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.0.title
    }

    #[must_use]
    pub fn descriptor(&self) -> &TrackDescriptor {
        &self.0
    }

    #[must_use]
    pub fn into_descriptor(self) -> TrackDescriptor {
        self.0
    }
}
