//! External transcoder supervision.
//!
//! One long-lived muxer process turns a continuous elementary stream on its
//! input into the listener-facing Ogg/Opus bitstream. Per track, a short-lived
//! fetcher process decodes the source URL, and the feed loop copies its
//! output into the muxer's input without ever closing it, which keeps the
//! outbound page sequence continuous across track boundaries.

mod process;
mod supervisor;

pub use process::{
    FetcherProcess, FfmpegTranscoder, MuxerInput, MuxerProcess, ProcessHandle, ProcessOutput,
    Transcoder,
};
pub use supervisor::{FeedOutcome, SupervisorState, TranscodeSupervisor};

use thiserror::Error;

/// Errors raised while driving transcoder processes.
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// The executable could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A spawned process came without the pipe we asked for.
    #[error("transcoder process has no {0} pipe")]
    MissingPipe(&'static str),

    /// No muxer is accepting input.
    #[error("muxer is not running")]
    MuxerUnavailable,
}
