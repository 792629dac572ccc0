//! Radiocast Core - continuous internet radio engine.
//!
//! This crate turns a rotating playlist into one never-ending Ogg/Opus
//! bitstream and serves it to any number of listeners joining mid-stream.
//! It is used by the headless `radiocast-server` binary.
//!
//! # Architecture
//!
//! - [`ogg`]: Page reader and packet reassembly for the muxer's output
//! - [`transcode`]: Muxer and fetcher processes, and the feed loop between them
//! - [`stream`]: Header cache and latest-unit broadcast to listeners
//! - [`scheduler`]: Explicit queue, auto-queue and track handoff
//! - [`resolver`]: Turning references into playable metadata (yt-dlp)
//! - [`events`]: Status events for the push endpoint
//! - [`api`]: HTTP surface
//! - [`bootstrap`]: Composition root
//!
//! # Abstraction Traits
//!
//! - [`Transcoder`](transcode::Transcoder): Spawning muxer and fetcher processes
//! - [`MediaResolver`](resolver::MediaResolver): Track metadata and media URLs
//! - [`TrackSink`](scheduler::TrackSink): Where resolved tracks are played
//! - [`EventEmitter`](events::EventEmitter): Emitting playback events
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning request workers

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod error;
pub mod events;
pub mod ogg;
pub mod protocol_constants;
pub mod resolver;
pub mod runtime;
pub mod scheduler;
pub mod state;
pub mod stream;
pub mod track;
pub mod transcode;
pub mod utils;

// Re-export commonly used types at the crate root
pub use error::{ErrorCode, RadioError, RadioResult};
pub use events::{EventChannel, EventEmitter, EventType, PlaybackEvent};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use state::{Config, PlaybackConfig, ResolverConfig, TranscoderConfig};
pub use track::{ResolvedTrack, TrackDescriptor};
pub use utils::now_millis;

// Re-export service types
pub use resolver::{MediaResolver, ResolveError, YtDlpResolver};
pub use scheduler::{PlaybackScheduler, TrackSink};
pub use stream::{BroadcastBuffer, Listener};
pub use transcode::{FeedOutcome, FfmpegTranscoder, TranscodeSupervisor, Transcoder};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, bootstrap_with, BootstrappedServices};

// Re-export API types
pub use api::{start_server, AppState, ServerError};
