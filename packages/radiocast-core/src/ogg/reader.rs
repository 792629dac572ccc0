use std::io::ErrorKind;

use async_stream::try_stream;
use bytes::BytesMut;
use futures::Stream;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{DemuxError, Page};
use crate::protocol_constants::{OGG_CAPTURE_PATTERN, OGG_PAGE_HEADER_LEN, OGG_STREAM_VERSION};

/// Sequential page reader over an async byte source.
///
/// The sequence is lazy and cannot be restarted: once it ends (end of input,
/// truncated page or an error) every further call returns `Ok(None)`.
pub struct OggPageReader<R> {
    reader: R,
    pages_read: u64,
    finished: bool,
}

impl<R: AsyncRead + Unpin> OggPageReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pages_read: 0,
            finished: false,
        }
    }

    /// Number of complete pages returned so far.
    #[must_use]
    pub fn pages_read(&self) -> u64 {
        self.pages_read
    }

    /// Reads the next page.
    ///
    /// Returns `Ok(None)` when the input ends, including in the middle of a
    /// page: a truncated tail means the producer went away, not that the
    /// stream is corrupt.
    ///
    /// # Errors
    ///
    /// [`DemuxError::Desync`] if the next bytes are not a page header,
    /// [`DemuxError::UnsupportedVersion`] for a non-zero version byte, and
    /// [`DemuxError::Io`] for read failures other than end of input.
    pub async fn next_page(&mut self) -> Result<Option<Page>, DemuxError> {
        if self.finished {
            return Ok(None);
        }
        match self.read_page().await {
            Ok(Some(page)) => {
                self.pages_read += 1;
                Ok(Some(page))
            }
            other => {
                self.finished = true;
                other
            }
        }
    }

    async fn read_page(&mut self) -> Result<Option<Page>, DemuxError> {
        let mut header = [0u8; OGG_PAGE_HEADER_LEN];
        if !self.fill(&mut header).await? {
            return Ok(None);
        }

        if &header[..4] != OGG_CAPTURE_PATTERN {
            let mut found = [0u8; 4];
            found.copy_from_slice(&header[..4]);
            return Err(DemuxError::Desync { found });
        }
        if header[4] != OGG_STREAM_VERSION {
            return Err(DemuxError::UnsupportedVersion(header[4]));
        }

        let mut segment_table = vec![0u8; header[26] as usize];
        if !self.fill(&mut segment_table).await? {
            log::debug!("[Demux] Input ended inside segment table");
            return Ok(None);
        }

        let payload_len: usize = segment_table.iter().map(|&v| v as usize).sum();
        let mut payload = BytesMut::zeroed(payload_len);
        if !self.fill(&mut payload).await? {
            log::debug!("[Demux] Input ended inside a {} byte payload", payload_len);
            return Ok(None);
        }

        Ok(Some(Page::new(header, segment_table, payload.freeze())))
    }

    /// Fills `buf` completely. Returns `false` if the input ended first.
    async fn fill(&mut self, buf: &mut [u8]) -> Result<bool, DemuxError> {
        match self.reader.read_exact(buf).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Turns the reader into a stream of pages.
    ///
    /// The stream yields at most one error and then ends.
    pub fn into_stream(mut self) -> impl Stream<Item = Result<Page, DemuxError>> {
        try_stream! {
            while let Some(page) = self.next_page().await? {
                yield page;
            }
        }
    }
}
