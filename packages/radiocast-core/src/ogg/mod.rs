//! Ogg container demuxing.
//!
//! A from-scratch reader for the page framing of RFC 3533. It recovers pages
//! from an async byte source, exposes their header fields and lacing, and
//! classifies them into stream header pages (replayed to every new listener)
//! and media pages (broadcast once).
//!
//! There is no resynchronisation: a capture pattern mismatch is reported as
//! [`DemuxError::Desync`] and ends the sequence. Truncated input simply ends
//! the sequence, which is how the muxer's output ends.

mod page;
mod reader;
#[cfg(test)]
pub(crate) mod test_fixtures;

pub use page::{Packet, PacketAssembler, Packets, Page, PageKind};
pub use reader::OggPageReader;

use thiserror::Error;

/// Errors that end a demux sequence.
#[derive(Debug, Error)]
pub enum DemuxError {
    /// Bytes where a page header was expected did not start with `OggS`.
    #[error("lost Ogg page sync, found {found:02x?} instead of capture pattern")]
    Desync { found: [u8; 4] },

    /// The page declares a stream structure version other than 0.
    #[error("unsupported Ogg stream version {0}")]
    UnsupportedVersion(u8),

    /// The underlying reader failed for a reason other than end of input.
    #[error("I/O error while reading Ogg pages: {0}")]
    Io(#[from] std::io::Error),
}
