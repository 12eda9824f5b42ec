//! Domain-specific error types for the AVO system.
//!
//! All fallible entry points return `Result<T, AvoError>`. Recoverable
//! conditions (malformed datagrams, queue overflow, noise-level pixel
//! differences) are absorbed where they occur and never surface here.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the AVO codec, archive and stream layers.
#[derive(Debug, Error)]
pub enum AvoError {
    // ── Wire protocol ────────────────────────────────────────────
    /// Received bytes that do not start with the AVOS magic sequence.
    #[error("invalid magic bytes: expected AVOS")]
    InvalidMagic,

    /// The protocol version carried by the packet is not supported.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The datagram is shorter than its header claims.
    #[error("packet too short: {len} bytes (need {need})")]
    PacketTooShort { len: usize, need: usize },

    // ── Archive ──────────────────────────────────────────────────
    /// A field in the archive header could not be accepted.
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),

    /// The archive body violated the container format.
    #[error("invalid archive: {0}")]
    InvalidArchive(String),

    /// An archive must hold at least its keyframe.
    #[error("archive holds no frames")]
    EmptyArchive,

    /// A frame buffer does not match the session geometry.
    #[error("frame size mismatch: expected {expected} bytes, got {actual}")]
    FrameSizeMismatch { expected: usize, actual: usize },

    // ── Streaming ────────────────────────────────────────────────
    /// The handshake completed with an unexpected reply.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// An internal channel was closed while the pipeline was running.
    #[error("channel closed")]
    ChannelClosed,

    // ── I/O ──────────────────────────────────────────────────────
    /// The file or socket layer reported an error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for AvoError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        AvoError::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = AvoError::InvalidMagic;
        assert!(e.to_string().contains("magic"));

        let e = AvoError::PacketTooShort { len: 10, need: 29 };
        assert!(e.to_string().contains("10"));
        assert!(e.to_string().contains("29"));

        let e = AvoError::FrameSizeMismatch {
            expected: 300,
            actual: 299,
        };
        assert!(e.to_string().contains("300"));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: AvoError = io_err.into();
        assert!(matches!(e, AvoError::Io(_)));
    }
}
