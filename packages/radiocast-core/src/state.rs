//! Configuration types for the radio engine.
//!
//! [`Config`] is plain data: the server binary builds it from its YAML file,
//! environment and CLI flags, and `bootstrap_services` hands the relevant
//! group to each component.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    DEFAULT_FALLBACK_TRACK, DEFAULT_OPUS_BITRATE_KBPS, DEFAULT_PLAYLIST_LIMIT,
    DEFAULT_QUEUE_PAGE_SIZE, DEFAULT_RECONNECT_DELAY_MAX_SECS, DEFAULT_RELATED_BATCH,
    EVENT_CHANNEL_CAPACITY, FEED_CHUNK_SIZE, MAX_TRACK_DURATION_SECS, OPUS_SAMPLE_RATE,
};

/// Configuration for the external transcoder processes.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TranscoderConfig {
    /// Path or name of the ffmpeg executable.
    pub ffmpeg_path: String,

    /// Thread count passed to both muxer and fetcher.
    pub threads: u32,

    /// Bitrate used when a fetcher has to re-encode (kbit/s).
    pub bitrate_kbps: u32,

    /// Output sample rate when re-encoding (Hz).
    pub sample_rate: u32,

    /// Upper bound of the fetcher's reconnect backoff (seconds).
    pub reconnect_delay_max_secs: u32,

    /// Size of each read from a fetcher's output (bytes).
    pub feed_chunk_size: usize,

    /// A track whose fetcher produces nothing for this long is abandoned.
    pub stall_timeout_secs: u64,

    /// Pause between a muxer dying and the next stream epoch starting.
    pub muxer_restart_delay_ms: u64,
}

impl TranscoderConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.ffmpeg_path.trim().is_empty() {
            return Err("ffmpeg_path must not be empty".to_string());
        }
        if self.threads == 0 {
            return Err("threads must be >= 1".to_string());
        }
        if self.feed_chunk_size == 0 {
            return Err("feed_chunk_size must be >= 1".to_string());
        }
        if self.stall_timeout_secs == 0 {
            return Err("stall_timeout_secs must be >= 1".to_string());
        }
        if self.bitrate_kbps == 0 || self.sample_rate == 0 {
            return Err("bitrate_kbps and sample_rate must be non-zero".to_string());
        }
        Ok(())
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }

    pub fn muxer_restart_delay(&self) -> Duration {
        Duration::from_millis(self.muxer_restart_delay_ms)
    }
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            threads: 2,
            bitrate_kbps: DEFAULT_OPUS_BITRATE_KBPS,
            sample_rate: OPUS_SAMPLE_RATE,
            reconnect_delay_max_secs: DEFAULT_RECONNECT_DELAY_MAX_SECS,
            feed_chunk_size: FEED_CHUNK_SIZE,
            stall_timeout_secs: 30,
            muxer_restart_delay_ms: 1000,
        }
    }
}

/// Configuration for track selection.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Tracks longer than this are never played (seconds).
    pub max_track_duration_secs: f64,

    /// How many related tracks one auto-queue refill asks for.
    pub related_batch_size: usize,

    /// Reference played when nothing else is available.
    pub fallback_track: String,

    /// References queued (unresolved) at startup.
    pub seed_tracks: Vec<String>,

    /// Entries per page on the queue endpoint.
    pub queue_page_size: usize,
}

impl PlaybackConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_track_duration_secs.is_nan() || self.max_track_duration_secs <= 0.0 {
            return Err("max_track_duration_secs must be positive".to_string());
        }
        if self.fallback_track.trim().is_empty() {
            return Err("fallback_track must not be empty".to_string());
        }
        if self.queue_page_size == 0 {
            return Err("queue_page_size must be >= 1".to_string());
        }
        Ok(())
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            max_track_duration_secs: MAX_TRACK_DURATION_SECS,
            related_batch_size: DEFAULT_RELATED_BATCH,
            fallback_track: DEFAULT_FALLBACK_TRACK.to_string(),
            seed_tracks: Vec::new(),
            queue_page_size: DEFAULT_QUEUE_PAGE_SIZE,
        }
    }
}

/// Configuration for the yt-dlp backed media resolver.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ResolverConfig {
    /// Path or name of the yt-dlp executable.
    pub ytdlp_path: String,

    /// Maximum entries taken from one playlist.
    pub playlist_limit: usize,

    /// Base URL of an Invidious-compatible API used for related tracks.
    pub related_api_base: String,

    /// Timeout for related-track HTTP requests (seconds).
    pub request_timeout_secs: u64,
}

impl ResolverConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.ytdlp_path.trim().is_empty() {
            return Err("ytdlp_path must not be empty".to_string());
        }
        if self.playlist_limit == 0 {
            return Err("playlist_limit must be >= 1".to_string());
        }
        if !self.related_api_base.starts_with("http://")
            && !self.related_api_base.starts_with("https://")
        {
            return Err(format!(
                "related_api_base must be an http(s) URL, got '{}'",
                self.related_api_base
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: "yt-dlp".to_string(),
            playlist_limit: DEFAULT_PLAYLIST_LIMIT,
            related_api_base: "https://invidious.nerdvpn.de".to_string(),
            request_timeout_secs: 15,
        }
    }
}

/// Configuration for the radiocast engine.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Preferred port for the HTTP server (0 = auto-allocate).
    pub preferred_port: u16,

    /// Capacity of the queue feeding the event dispatcher.
    pub event_channel_capacity: usize,

    pub transcoder: TranscoderConfig,

    pub playback: PlaybackConfig,

    pub resolver: ResolverConfig,
}

impl Config {
    /// Validates every configuration group.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (mpsc::channel panics on 0)".to_string(),
            );
        }
        self.transcoder.validate()?;
        self.playback.validate()?;
        self.resolver.validate()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_port: 5000,
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
            transcoder: TranscoderConfig::default(),
            playback: PlaybackConfig::default(),
            resolver: ResolverConfig::default(),
        }
    }
}
