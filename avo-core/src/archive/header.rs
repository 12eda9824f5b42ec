//! The 20-byte `.avo` file header.
//!
//! Five `u32` fields serialized in **native byte order** — unlike every
//! other multi-byte field in the system, which is big-endian. The quirk
//! is inherited from the original on-disk format and kept for
//! compatibility; archives are not portable across endianness.

use crate::error::AvoError;
use crate::frame::frame_len;

/// Serialized header size.
pub const HEADER_LENGTH: usize = 20;

/// On-disk archive header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvoHeader {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Advisory frame rate; 0 means "use the recorded delays".
    pub fps: u32,
    /// Number of frames in the archive, keyframe included.
    pub total_frames: u32,
    /// Byte size of the raw keyframe — always `3 * width * height`.
    pub first_frame_size: u32,
}

impl AvoHeader {
    /// Serialize to the on-disk layout (native byte order).
    pub fn to_bytes(&self) -> [u8; HEADER_LENGTH] {
        let mut buf = [0u8; HEADER_LENGTH];
        buf[0..4].copy_from_slice(&self.width.to_ne_bytes());
        buf[4..8].copy_from_slice(&self.height.to_ne_bytes());
        buf[8..12].copy_from_slice(&self.fps.to_ne_bytes());
        buf[12..16].copy_from_slice(&self.total_frames.to_ne_bytes());
        buf[16..20].copy_from_slice(&self.first_frame_size.to_ne_bytes());
        buf
    }

    /// Deserialize and validate a header read from disk.
    pub fn from_bytes(bytes: [u8; HEADER_LENGTH]) -> Result<Self, AvoError> {
        let header = Self {
            width: u32::from_ne_bytes(bytes[0..4].try_into().unwrap()),
            height: u32::from_ne_bytes(bytes[4..8].try_into().unwrap()),
            fps: u32::from_ne_bytes(bytes[8..12].try_into().unwrap()),
            total_frames: u32::from_ne_bytes(bytes[12..16].try_into().unwrap()),
            first_frame_size: u32::from_ne_bytes(bytes[16..20].try_into().unwrap()),
        };

        if header.width == 0 || header.height == 0 {
            return Err(AvoError::InvalidHeader("zero frame geometry"));
        }
        if header.first_frame_size == 0 {
            return Err(AvoError::InvalidHeader("zero keyframe size"));
        }
        if header.first_frame_size as usize != frame_len(header.width, header.height) {
            return Err(AvoError::InvalidHeader(
                "keyframe size does not match geometry",
            ));
        }

        Ok(header)
    }
}

// ── Tests ────────────────────────────────────────────────────────
