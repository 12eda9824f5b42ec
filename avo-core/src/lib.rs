//! # avo-core — real-time RGB streaming and the `.avo` archive
//!
//! Streams raw RGB frame sequences over best-effort UDP and persists
//! them into a self-contained archive replayable at the original
//! cadence.
//!
//! ```text
//! PRODUCER (camera)                             CONSUMER (display)
//! ┌──────────────────────────┐                 ┌──────────────────────────┐
//! │ submit()                 │                 │ callback(frame, w, h)    │
//! │   ↓ ingest buffer        │                 │   ↑ decoder pool         │
//! │ buffer worker            │      UDP        │ decode queue             │
//! │   ↓ encoder pool         │  ──────────►    │   ↑ reassembly           │
//! │ send queue               │                 │ receive loop             │
//! │   ↓ sender / fragmenter  │                 │                          │
//! └──────────────────────────┘                 └──────────────────────────┘
//!
//! Archive: producer ─► ArchiveWriter ─► .avo file ─► ArchiveReader
//!          ─► PlaybackScheduler ─► consumer
//! ```
//!
//! ## Modules
//!
//! | Module     | Purpose                                            |
//! |------------|----------------------------------------------------|
//! | `frame`    | The tightly-packed RGB frame type                  |
//! | `codec`    | Thresholded pixel diff and RLE serialization       |
//! | `archive`  | `.avo` container and legacy `.avop` diff files     |
//! | `net`      | Wire format, stream server and stream client       |
//! | `playback` | Wall-clock scheduler with drift compensation       |
//! | `error`    | The `AvoError` taxonomy                            |
//!
//! Delivery is strictly best-effort: no retransmission, no forward
//! error correction, exactly one active receiver per server instance.

pub mod archive;
pub mod codec;
pub mod error;
pub mod frame;
pub mod net;
pub mod playback;

// ── Re-exports ───────────────────────────────────────────────────

pub use archive::{ArchiveReader, ArchiveWriter, AvoHeader, RecordedFrame};
pub use codec::{apply_changes, compare_frames, diff_percentage, PixelChange, PIXEL_THRESHOLD};
pub use error::AvoError;
pub use frame::{frame_len, RgbFrame, BYTES_PER_PIXEL};
pub use net::{
    ClientConfig, ClientStatsSnapshot, FrameSink, PacketHeader, ServerConfig,
    ServerStatsSnapshot, StreamClient, StreamServer, MAX_PAYLOAD,
};
pub use playback::{PlaybackHandle, PlaybackScheduler};
