//! Fixed-record serialization of change lists.
//!
//! Each [`PixelChange`] becomes one 8-byte record:
//!
//! ```text
//! offset: u32  (4, big-endian)
//! count:  u8   (1)
//! r:      u8   (1)
//! g:      u8   (1)
//! b:      u8   (1)
//! ```
//!
//! There is no framing and no record count: the stream ends where the
//! bytes end. The decoder consumes whole records and silently discards
//! a trailing partial record; it performs no ordering validation, which
//! is sound because [`apply_changes`](crate::codec::apply_changes) is
//! order-independent for the non-overlapping runs the encoder emits.

use crate::codec::delta::PixelChange;

/// Serialized size of one change record.
pub const RECORD_SIZE: usize = 8;

/// Serialize a change list into the 8-byte-record stream.
pub fn compress(changes: &[PixelChange]) -> Vec<u8> {
    let mut out = Vec::with_capacity(changes.len() * RECORD_SIZE);
    for change in changes {
        out.extend_from_slice(&change.offset.to_be_bytes());
        out.push(change.count);
        out.extend_from_slice(&change.rgb);
    }
    out
}

/// Deserialize a record stream, preserving record order verbatim.
pub fn decompress(data: &[u8]) -> Vec<PixelChange> {
    let mut changes = Vec::with_capacity(data.len() / RECORD_SIZE);
    for record in data.chunks_exact(RECORD_SIZE) {
        changes.push(PixelChange {
            offset: u32::from_be_bytes(record[0..4].try_into().unwrap()),
            count: record[4],
            rgb: [record[5], record[6], record[7]],
        });
    }
    changes
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_preserves_records() {
        let changes = vec![
            PixelChange { offset: 1, count: 2, rgb: [255, 0, 0] },
            PixelChange { offset: 3, count: 1, rgb: [0, 255, 0] },
            PixelChange { offset: 70_000, count: 255, rgb: [1, 2, 3] },
        ];
        let bytes = compress(&changes);
        assert_eq!(bytes.len(), 3 * RECORD_SIZE);
        assert_eq!(decompress(&bytes), changes);
    }

    #[test]
    fn two_records_are_sixteen_bytes() {
        let changes = vec![
            PixelChange { offset: 1, count: 2, rgb: [255, 0, 0] },
            PixelChange { offset: 3, count: 1, rgb: [0, 255, 0] },
        ];
        assert_eq!(compress(&changes).len(), 16);
    }

    #[test]
    fn offset_is_big_endian() {
        let bytes = compress(&[PixelChange { offset: 0x0102_0304, count: 9, rgb: [4, 5, 6] }]);
        assert_eq!(&bytes[0..4], &[1, 2, 3, 4]);
        assert_eq!(bytes[4], 9);
    }

    #[test]
    fn trailing_partial_record_is_discarded() {
        let mut bytes = compress(&[PixelChange { offset: 5, count: 1, rgb: [9, 9, 9] }]);
        bytes.extend_from_slice(&[0xAA, 0xBB, 0xCC]); // 3 stray bytes
        let decoded = decompress(&bytes);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].offset, 5);
    }

    #[test]
    fn empty_stream_decodes_to_empty_list() {
        assert!(decompress(&[]).is_empty());
    }

    #[test]
    fn decoder_keeps_file_order() {
        // Descending offsets pass through untouched.
        let changes = vec![
            PixelChange { offset: 9, count: 1, rgb: [1, 1, 1] },
            PixelChange { offset: 2, count: 1, rgb: [2, 2, 2] },
        ];
        assert_eq!(decompress(&compress(&changes)), changes);
    }
}
