//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by external specifications (Ogg framing, HTTP
//! server-sent events) or by the contract with the external transcoder, and
//! changing them would break compatibility with listeners.

// ─────────────────────────────────────────────────────────────────────────────
// Ogg Container (RFC 3533)
// ─────────────────────────────────────────────────────────────────────────────

/// Capture pattern that starts every Ogg page.
pub const OGG_CAPTURE_PATTERN: &[u8; 4] = b"OggS";

/// Length of the fixed part of an Ogg page header, capture pattern included.
pub const OGG_PAGE_HEADER_LEN: usize = 27;

/// Only stream structure version defined by the format.
pub const OGG_STREAM_VERSION: u8 = 0;

/// A lacing value of this size means the packet continues in the next segment.
pub const OGG_MAX_SEGMENT_LEN: u8 = 255;

/// Header type flag: page continues a packet from the previous page.
pub const OGG_FLAG_CONTINUED: u8 = 0x01;

/// Header type flag: first page of a logical bitstream.
pub const OGG_FLAG_BOS: u8 = 0x02;

/// Header type flag: last page of a logical bitstream.
pub const OGG_FLAG_EOS: u8 = 0x04;

/// Page sequence number of the page carrying the Opus comment header.
pub const OGG_COMMENT_PAGE_SEQUENCE: u32 = 1;

/// MIME type announced on the listener endpoint.
pub const OGG_AUDIO_MIME: &str = "audio/ogg";

// ─────────────────────────────────────────────────────────────────────────────
// Server-Sent Events
// ─────────────────────────────────────────────────────────────────────────────

/// MIME type of the status/event endpoint.
pub const EVENT_STREAM_MIME: &str = "text/event-stream";

// ─────────────────────────────────────────────────────────────────────────────
// Playback Policy
// ─────────────────────────────────────────────────────────────────────────────

/// Longest track accepted for playback (seconds).
///
/// Tracks over 15 minutes are filtered out of playlists and refused on
/// resolution.
pub const MAX_TRACK_DURATION_SECS: f64 = 900.0;

/// Number of related tracks fetched per auto-queue refill.
pub const DEFAULT_RELATED_BATCH: usize = 2;

/// Maximum number of entries taken from a single playlist listing.
pub const DEFAULT_PLAYLIST_LIMIT: usize = 10;

/// Number of queue entries returned per page by the queue endpoint.
pub const DEFAULT_QUEUE_PAGE_SIZE: usize = 5;

/// Track played when neither queue nor related lookup yields anything.
pub const DEFAULT_FALLBACK_TRACK: &str = "https://www.youtube.com/watch?v=QkAZ58VEXzM";

// ─────────────────────────────────────────────────────────────────────────────
// Transcoder Contract
// ─────────────────────────────────────────────────────────────────────────────

/// Size of each chunk copied from a fetcher into the muxer (bytes).
pub const FEED_CHUNK_SIZE: usize = 8192;

/// Sample rate of the outbound Opus stream (Hz).
pub const OPUS_SAMPLE_RATE: u32 = 48000;

/// Default bitrate when a fetcher has to re-encode (kbit/s).
pub const DEFAULT_OPUS_BITRATE_KBPS: u32 = 152;

/// Upper bound of the fetcher's network reconnect backoff (seconds).
pub const DEFAULT_RECONNECT_DELAY_MAX_SECS: u32 = 5;

/// Codec name reported by the resolver for sources that need no re-encode.
pub const OPUS_CODEC_NAME: &str = "opus";

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Application name used in HTTP headers (`icy-name`).
pub const APP_NAME: &str = "radiocast";

/// Service identifier returned by the health endpoint.
pub const SERVICE_ID: &str = "radiocast";

/// Capacity of the queue feeding the event dispatcher.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Server
// ─────────────────────────────────────────────────────────────────────────────

/// First port tried when no preferred port is configured.
pub const PORT_RANGE_START: u16 = 49500;

/// Last port tried when no preferred port is configured.
pub const PORT_RANGE_END: u16 = 49510;
