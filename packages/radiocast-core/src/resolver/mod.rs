//! Track reference resolution.
//!
//! The scheduler only talks to the [`MediaResolver`] trait. [`YtDlpResolver`]
//! is the production implementation; tests substitute in-memory fakes.

mod ytdlp;

pub use ytdlp::YtDlpResolver;

use async_trait::async_trait;
use thiserror::Error;

use crate::track::TrackDescriptor;

/// Reasons a reference could not be turned into playable metadata.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to run extractor: {0}")]
    Spawn(#[source] std::io::Error),

    /// The extractor ran but reported a failure (removed, private, geo-blocked...).
    #[error("extractor failed: {0}")]
    Extractor(String),

    #[error("unreadable extractor output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("related tracks request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("track is {duration:.0}s long, limit is {max:.0}s")]
    TooLong { duration: f64, max: f64 },

    #[error("nothing playable found for {0}")]
    NotFound(String),
}

/// Source of track metadata and direct media URLs.
///
/// Implementations must not touch playback state. Every method may be
/// called concurrently from the scheduler loop and from request workers.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Resolves a reference into a descriptor.
    ///
    /// With `want_direct_url` the descriptor is fully resolved (it carries a
    /// media URL); without it only listing metadata is fetched. Tracks over
    /// the duration limit are rejected with [`ResolveError::TooLong`].
    async fn resolve(
        &self,
        reference: &str,
        want_direct_url: bool,
    ) -> Result<TrackDescriptor, ResolveError>;

    /// Lists a playlist as unresolved descriptors, bounded in count and with
    /// over-length entries left out.
    async fn list_playlist(&self, reference: &str) -> Result<Vec<TrackDescriptor>, ResolveError>;

    /// Up to `limit` unresolved tracks related to `track`. Failures yield an
    /// empty list.
    async fn related_tracks(&self, track: &TrackDescriptor, limit: usize) -> Vec<TrackDescriptor>;
}
