//! The legacy `.avop` single-diff file.
//!
//! Stores one frame as an RLE delta against a base frame the caller
//! already holds:
//!
//! ```text
//! delay_ms:  u32 (big-endian)
//! data_size: u32 (big-endian)
//! payload    (data_size bytes of RLE records)
//! ```
//!
//! An empty payload means "no change".

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::codec::{apply_changes, compare_frames, rle};
use crate::error::AvoError;
use crate::frame::frame_len;

/// Encode the difference between two frames into an `.avop` file.
pub fn write_diff_file<P: AsRef<Path>>(
    path: P,
    prev: &[u8],
    curr: &[u8],
    width: u32,
    height: u32,
    delay_ms: u32,
) -> Result<(), AvoError> {
    let expected = frame_len(width, height);
    if prev.len() != expected {
        return Err(AvoError::FrameSizeMismatch {
            expected,
            actual: prev.len(),
        });
    }
    if curr.len() != expected {
        return Err(AvoError::FrameSizeMismatch {
            expected,
            actual: curr.len(),
        });
    }

    let changes = compare_frames(prev, curr, width, height);
    let payload = rle::compress(&changes);

    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(&delay_ms.to_be_bytes())?;
    out.write_all(&(payload.len() as u32).to_be_bytes())?;
    out.write_all(&payload)?;
    out.flush()?;
    Ok(())
}

/// Decode an `.avop` file against the base frame, returning the
/// reconstructed frame and the recorded delay.
pub fn read_diff_file<P: AsRef<Path>>(
    path: P,
    prev: &[u8],
    width: u32,
    height: u32,
) -> Result<(Vec<u8>, u32), AvoError> {
    let expected = frame_len(width, height);
    if prev.len() != expected {
        return Err(AvoError::FrameSizeMismatch {
            expected,
            actual: prev.len(),
        });
    }

    let mut input = BufReader::new(File::open(path)?);
    let mut word = [0u8; 4];
    input.read_exact(&mut word)?;
    let delay_ms = u32::from_be_bytes(word);
    input.read_exact(&mut word)?;
    let data_size = u32::from_be_bytes(word) as usize;

    if data_size == 0 {
        return Ok((prev.to_vec(), delay_ms));
    }

    let mut payload = vec![0u8; data_size];
    input.read_exact(&mut payload)?;
    let changes = rle::decompress(&payload);
    Ok((apply_changes(prev, &changes, width, height), delay_ms))
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("avop-{}-{}", std::process::id(), name))
    }

    #[test]
    fn diff_file_roundtrip() {
        let path = temp_path("roundtrip");
        let prev = vec![0u8; frame_len(8, 8)];
        let mut curr = prev.clone();
        for pixel in 5..25 {
            curr[pixel * 3..pixel * 3 + 3].copy_from_slice(&[210, 30, 30]);
        }

        write_diff_file(&path, &prev, &curr, 8, 8, 33).unwrap();
        let (rebuilt, delay) = read_diff_file(&path, &prev, 8, 8).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(delay, 33);
        assert_eq!(rebuilt, curr);
    }

    #[test]
    fn empty_payload_means_no_change() {
        let path = temp_path("nochange");
        let frame = vec![77u8; frame_len(4, 4)];

        write_diff_file(&path, &frame, &frame, 4, 4, 16).unwrap();
        let (rebuilt, delay) = read_diff_file(&path, &frame, 4, 4).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(delay, 16);
        assert_eq!(rebuilt, frame);
    }

    #[test]
    fn mismatched_base_is_rejected() {
        let path = temp_path("mismatch");
        let result = write_diff_file(&path, &[0u8; 3], &[0u8; 12], 2, 2, 0);
        assert!(matches!(result, Err(AvoError::FrameSizeMismatch { .. })));
    }
}
