//! Hand-built Ogg byte streams for tests.

use bytes::Bytes;

use super::Page;
use crate::protocol_constants::{
    OGG_CAPTURE_PATTERN, OGG_FLAG_BOS, OGG_FLAG_CONTINUED, OGG_MAX_SEGMENT_LEN,
    OGG_PAGE_HEADER_LEN,
};

pub(crate) const SERIAL: u32 = 0x5241_4449;

/// Encodes one page. The checksum field is left at zero.
pub(crate) fn page_bytes(
    flags: u8,
    sequence: u32,
    granule: i64,
    segment_table: &[u8],
    payload: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(OGG_PAGE_HEADER_LEN + segment_table.len() + payload.len());
    out.extend_from_slice(OGG_CAPTURE_PATTERN);
    out.push(0);
    out.push(flags);
    out.extend_from_slice(&granule.to_le_bytes());
    out.extend_from_slice(&SERIAL.to_le_bytes());
    out.extend_from_slice(&sequence.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.push(segment_table.len() as u8);
    out.extend_from_slice(segment_table);
    out.extend_from_slice(payload);
    out
}

/// Splits one encoded page back into a [`Page`] without going through the reader.
pub(crate) fn parse_single_page(raw: &[u8]) -> Page {
    let mut header = [0u8; OGG_PAGE_HEADER_LEN];
    header.copy_from_slice(&raw[..OGG_PAGE_HEADER_LEN]);
    let segments = header[26] as usize;
    let table_end = OGG_PAGE_HEADER_LEN + segments;
    let segment_table = raw[OGG_PAGE_HEADER_LEN..table_end].to_vec();
    let payload = Bytes::copy_from_slice(&raw[table_end..]);
    Page::new(header, segment_table, payload)
}

/// Laces `packets` into pages of at most `max_segments` lacing values.
///
/// The first page carries BOS; any page opening in the middle of a packet
/// carries the continued flag.
pub(crate) fn lace_packets(packets: &[Vec<u8>], max_segments: usize) -> Vec<u8> {
    // (lacing value, slice of the packet, first segment of its packet)
    let mut segments: Vec<(u8, &[u8], bool)> = Vec::new();
    for packet in packets {
        let mut rest = packet.as_slice();
        let mut first = true;
        loop {
            let take = rest.len().min(OGG_MAX_SEGMENT_LEN as usize);
            segments.push((take as u8, &rest[..take], first));
            first = false;
            rest = &rest[take..];
            if take < OGG_MAX_SEGMENT_LEN as usize {
                break;
            }
        }
    }

    let mut out = Vec::new();
    for (sequence, chunk) in segments.chunks(max_segments.max(1)).enumerate() {
        let mut flags = 0;
        if sequence == 0 {
            flags |= OGG_FLAG_BOS;
        }
        if !chunk[0].2 {
            flags |= OGG_FLAG_CONTINUED;
        }
        let table: Vec<u8> = chunk.iter().map(|s| s.0).collect();
        let payload: Vec<u8> = chunk.iter().flat_map(|s| s.1.iter().copied()).collect();
        out.extend(page_bytes(flags, sequence as u32, 0, &table, &payload));
    }
    out
}

/// An identification page, a comment page and `media_pages` audio pages.
pub(crate) fn opus_stream(media_pages: u32) -> Vec<u8> {
    let mut out = page_bytes(OGG_FLAG_BOS, 0, 0, &[19], &opus_head());
    out.extend(page_bytes(0, 1, 0, &[16], b"OpusTags\0\0\0\0\0\0\0\0"));
    for i in 0..media_pages {
        let payload = media_payload(i);
        out.extend(page_bytes(
            0,
            i + 2,
            960 * (i as i64 + 1),
            &[payload.len() as u8],
            &payload,
        ));
    }
    out
}

/// Body of the `n`th media page in [`opus_stream`].
pub(crate) fn media_payload(n: u32) -> Vec<u8> {
    format!("opus-frame-{n:04}").into_bytes()
}

fn opus_head() -> Vec<u8> {
    let mut head = b"OpusHead".to_vec();
    head.push(1); // version
    head.push(2); // channels
    head.extend_from_slice(&312u16.to_le_bytes());
    head.extend_from_slice(&48_000u32.to_le_bytes());
    head.extend_from_slice(&0i16.to_le_bytes());
    head.push(0);
    head
}
