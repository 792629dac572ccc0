use bytes::{Bytes, BytesMut};

use crate::protocol_constants::{
    OGG_COMMENT_PAGE_SEQUENCE, OGG_FLAG_BOS, OGG_FLAG_CONTINUED, OGG_FLAG_EOS,
    OGG_MAX_SEGMENT_LEN, OGG_PAGE_HEADER_LEN,
};

/// How a page is treated by the broadcast layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Identification or comment page, cached and replayed to new listeners.
    Header,
    /// Audio page, published once as a media unit.
    Media,
}

/// One Ogg page, kept verbatim.
///
/// Layout of `header` (little-endian fields):
///
/// | offset | size | field                   |
/// |--------|------|-------------------------|
/// | 0      | 4    | capture pattern `OggS`  |
/// | 4      | 1    | stream structure version|
/// | 5      | 1    | header type flags       |
/// | 6      | 8    | granule position        |
/// | 14     | 4    | bitstream serial number |
/// | 18     | 4    | page sequence number    |
/// | 22     | 4    | CRC checksum            |
/// | 26     | 1    | number of segments      |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    header: [u8; OGG_PAGE_HEADER_LEN],
    segment_table: Vec<u8>,
    payload: Bytes,
}

impl Page {
    pub(crate) fn new(
        header: [u8; OGG_PAGE_HEADER_LEN],
        segment_table: Vec<u8>,
        payload: Bytes,
    ) -> Self {
        Self {
            header,
            segment_table,
            payload,
        }
    }

    /// The fixed 27-byte header, capture pattern included.
    #[must_use]
    pub fn header_bytes(&self) -> &[u8] {
        &self.header
    }

    #[must_use]
    pub fn segment_table(&self) -> &[u8] {
        &self.segment_table
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[must_use]
    pub fn version(&self) -> u8 {
        self.header[4]
    }

    /// Header type flag byte (bit 0 continued, bit 1 BOS, bit 2 EOS).
    #[must_use]
    pub fn flags(&self) -> u8 {
        self.header[5]
    }

    #[must_use]
    pub fn is_continued(&self) -> bool {
        self.flags() & OGG_FLAG_CONTINUED != 0
    }

    #[must_use]
    pub fn is_bos(&self) -> bool {
        self.flags() & OGG_FLAG_BOS != 0
    }

    #[must_use]
    pub fn is_eos(&self) -> bool {
        self.flags() & OGG_FLAG_EOS != 0
    }

    #[must_use]
    pub fn granule_position(&self) -> i64 {
        i64::from_le_bytes(self.field::<8>(6))
    }

    #[must_use]
    pub fn serial(&self) -> u32 {
        u32::from_le_bytes(self.field::<4>(14))
    }

    #[must_use]
    pub fn sequence(&self) -> u32 {
        u32::from_le_bytes(self.field::<4>(18))
    }

    #[must_use]
    pub fn checksum(&self) -> u32 {
        u32::from_le_bytes(self.field::<4>(22))
    }

    fn field<const N: usize>(&self, offset: usize) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.header[offset..offset + N]);
        out
    }

    /// Header page if it opens the bitstream or carries the comment header.
    #[must_use]
    pub fn kind(&self) -> PageKind {
        if self.is_bos() || self.sequence() == OGG_COMMENT_PAGE_SEQUENCE {
            PageKind::Header
        } else {
            PageKind::Media
        }
    }

    /// Total encoded size of the page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.header.len() + self.segment_table.len() + self.payload.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segment_table.is_empty()
    }

    /// Packets (or packet fragments) carried by this page, in order.
    pub fn packets(&self) -> Packets<'_> {
        Packets {
            page: self,
            segment: 0,
            offset: 0,
        }
    }

    /// Re-encodes the page: header, segment table, then every packet
    /// fragment in lacing order.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.len());
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.segment_table);
        for packet in self.packets() {
            out.extend_from_slice(packet.data);
        }
        out.freeze()
    }
}

/// A run of lacing segments within one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet<'a> {
    pub data: &'a [u8],
    /// First run of a page flagged as continuing the previous page's packet.
    pub continues_previous: bool,
    /// `false` when the run ends the page on a 255 lacing value and the
    /// packet goes on in the next page.
    pub complete: bool,
}

/// Iterator over the packet runs of a page.
pub struct Packets<'a> {
    page: &'a Page,
    segment: usize,
    offset: usize,
}

impl<'a> Iterator for Packets<'a> {
    type Item = Packet<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let table = &self.page.segment_table;
        if self.segment >= table.len() {
            return None;
        }

        let continues_previous = self.segment == 0 && self.page.is_continued();
        let start = self.offset;
        let mut complete = false;
        while self.segment < table.len() {
            let lacing = table[self.segment];
            self.segment += 1;
            self.offset += lacing as usize;
            if lacing < OGG_MAX_SEGMENT_LEN {
                complete = true;
                break;
            }
        }

        // The reader sizes the payload from the table, so this only guards
        // pages built by hand.
        let end = self.offset.min(self.page.payload.len());
        let start = start.min(end);
        Some(Packet {
            data: &self.page.payload[start..end],
            continues_previous,
            complete,
        })
    }
}

/// Joins packet runs across pages into whole packets.
///
/// Pages only know their own lacing, so carrying an unterminated packet into
/// the next page is up to the caller; this is that caller.
#[derive(Debug, Default)]
pub struct PacketAssembler {
    pending: BytesMut,
    has_pending: bool,
}

impl PacketAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one page, returning every packet it completes.
    ///
    /// A pending fragment that the page does not continue is dropped, as is
    /// a continuation with nothing pending (stream joined mid-packet).
    pub fn push(&mut self, page: &Page) -> Vec<Bytes> {
        let mut complete = Vec::new();
        for packet in page.packets() {
            if !packet.continues_previous && self.has_pending {
                log::debug!(
                    "[Demux] Dropping {} byte fragment not continued by page {}",
                    self.pending.len(),
                    page.sequence()
                );
                self.pending.clear();
                self.has_pending = false;
            }
            if packet.continues_previous && !self.has_pending {
                continue;
            }

            self.pending.extend_from_slice(packet.data);
            if packet.complete {
                complete.push(self.pending.split().freeze());
                self.has_pending = false;
            } else {
                self.has_pending = true;
            }
        }
        complete
    }

    /// Bytes held for a packet that has not been terminated yet.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
