//! The `.avo` container: one raw keyframe followed by delta frames,
//! each carrying the real delay measured at capture.
//!
//! ## Layout
//!
//! ```text
//! AvoHeader                 (20 bytes, native byte order)
//! first frame delay_ms: u32 (big-endian)
//! keyframe                  (first_frame_size raw RGB bytes)
//! then, per remaining frame:
//!   frame_type:   u8        (0 = delta, 1 = full)
//!   delay_ms:     u32       (big-endian)
//!   payload_size: u32       (big-endian)
//!   payload                 (RLE records for deltas, raw RGB for full)
//! ```
//!
//! Deltas are computed against the **decoded previous output frame**,
//! not the raw previous input: the writer replays its own deltas so the
//! reference drifts identically on both sides of the format.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::debug;

use crate::archive::header::{AvoHeader, HEADER_LENGTH};
use crate::codec::{apply_changes, compare_frames, rle};
use crate::error::AvoError;
use crate::frame::frame_len;

/// Delta frame: RLE payload against the previous output frame.
const FRAME_TYPE_DELTA: u8 = 0;
/// Full frame: raw RGB payload, independent of prior frames.
const FRAME_TYPE_FULL: u8 = 1;

/// Delays are clamped to this many milliseconds at capture time.
pub const MAX_FRAME_DELAY_MS: u32 = 1000;

// ── RecordedFrame ────────────────────────────────────────────────

/// A fully reconstructed frame as published by the decoder.
///
/// Every decoded frame is a full frame regardless of its on-disk form,
/// so `is_full_frame` is always true on the read path; the field exists
/// so playback consumers share one type with live-stream consumers.
#[derive(Debug, Clone)]
pub struct RecordedFrame {
    /// Raw RGB pixel data, `3 * width * height` bytes.
    pub data: Vec<u8>,
    /// Real delay to the next frame in milliseconds.
    pub delay_ms: u32,
    /// Whether the frame was stored as a keyframe.
    pub is_full_frame: bool,
}

// ── ArchiveWriter ────────────────────────────────────────────────

/// Streaming `.avo` encoder.
///
/// The first recorded frame becomes the keyframe; every later frame is
/// stored as a delta unless its RLE payload would not be smaller than
/// the raw frame, in which case a full frame is written instead.
/// `total_frames` is back-patched into the header by [`finish`](Self::finish).
pub struct ArchiveWriter<W: Write + Seek> {
    out: W,
    width: u32,
    height: u32,
    frames_written: u32,
    /// Decoded previous output frame — the delta baseline.
    reference: Option<Vec<u8>>,
}

impl ArchiveWriter<BufWriter<File>> {
    /// Create an archive file at `path`.
    pub fn create<P: AsRef<Path>>(
        path: P,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Self, AvoError> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), width, height, fps)
    }
}

impl<W: Write + Seek> ArchiveWriter<W> {
    /// Start an archive on an arbitrary `Write + Seek` sink.
    pub fn new(mut out: W, width: u32, height: u32, fps: u32) -> Result<Self, AvoError> {
        if width == 0 || height == 0 {
            return Err(AvoError::InvalidHeader("zero frame geometry"));
        }

        // total_frames is unknown until finish(); write 0 for now.
        let header = AvoHeader {
            width,
            height,
            fps,
            total_frames: 0,
            first_frame_size: frame_len(width, height) as u32,
        };
        out.write_all(&header.to_bytes())?;

        Ok(Self {
            out,
            width,
            height,
            frames_written: 0,
            reference: None,
        })
    }

    /// Append one frame with the real delay since the previous one.
    ///
    /// `delay_ms` is clamped to [`MAX_FRAME_DELAY_MS`].
    pub fn record(&mut self, frame: &[u8], delay_ms: u32) -> Result<(), AvoError> {
        let expected = frame_len(self.width, self.height);
        if frame.len() != expected {
            return Err(AvoError::FrameSizeMismatch {
                expected,
                actual: frame.len(),
            });
        }
        let delay = delay_ms.min(MAX_FRAME_DELAY_MS);

        match self.reference.as_mut() {
            None => {
                // Keyframe: delay + raw RGB, sizes fixed by the header.
                self.out.write_all(&delay.to_be_bytes())?;
                self.out.write_all(frame)?;
                self.reference = Some(frame.to_vec());
            }
            Some(reference) => {
                let changes = compare_frames(reference, frame, self.width, self.height);
                let payload = rle::compress(&changes);

                if payload.len() >= expected {
                    // RLE does not pay: store a full frame and resync
                    // the reference to the exact pixels.
                    debug!(
                        frame = self.frames_written,
                        payload = payload.len(),
                        "delta larger than raw frame, storing keyframe"
                    );
                    self.out.write_all(&[FRAME_TYPE_FULL])?;
                    self.out.write_all(&delay.to_be_bytes())?;
                    self.out.write_all(&(expected as u32).to_be_bytes())?;
                    self.out.write_all(frame)?;
                    reference.copy_from_slice(frame);
                } else {
                    self.out.write_all(&[FRAME_TYPE_DELTA])?;
                    self.out.write_all(&delay.to_be_bytes())?;
                    self.out.write_all(&(payload.len() as u32).to_be_bytes())?;
                    self.out.write_all(&payload)?;
                    *reference = apply_changes(reference, &changes, self.width, self.height);
                }
            }
        }

        self.frames_written += 1;
        Ok(())
    }

    /// Number of frames recorded so far.
    pub fn frame_count(&self) -> u32 {
        self.frames_written
    }

    /// Back-patch `total_frames` and flush.
    ///
    /// Refuses to finalize an archive without its keyframe.
    pub fn finish(mut self) -> Result<(), AvoError> {
        if self.frames_written == 0 {
            return Err(AvoError::EmptyArchive);
        }
        // total_frames lives at byte offset 12 of the header.
        self.out.seek(SeekFrom::Start(12))?;
        self.out.write_all(&self.frames_written.to_ne_bytes())?;
        self.out.seek(SeekFrom::End(0))?;
        self.out.flush()?;
        Ok(())
    }
}

// ── ArchiveReader ────────────────────────────────────────────────

/// `.avo` decoder: reconstructs every frame as a full RGB buffer.
pub struct ArchiveReader<R: Read> {
    input: R,
    header: AvoHeader,
}

impl ArchiveReader<BufReader<File>> {
    /// Open an archive file for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, AvoError> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read> ArchiveReader<R> {
    /// Read and validate the header from an arbitrary source.
    pub fn new(mut input: R) -> Result<Self, AvoError> {
        let mut raw = [0u8; HEADER_LENGTH];
        input.read_exact(&mut raw)?;
        let header = AvoHeader::from_bytes(raw)?;
        Ok(Self { input, header })
    }

    /// The archive header.
    pub fn header(&self) -> &AvoHeader {
        &self.header
    }

    /// Decode the whole archive into full frames with their delays.
    ///
    /// `Fᵢ = apply(Fᵢ₋₁, rle(Dᵢ))` starting from the keyframe; a
    /// zero-length delta consumes its record and re-emits the previous
    /// frame unchanged.
    pub fn read_all(mut self) -> Result<Vec<RecordedFrame>, AvoError> {
        let width = self.header.width;
        let height = self.header.height;
        let expected = frame_len(width, height);
        let total = self.header.total_frames as usize;
        if total == 0 {
            return Err(AvoError::EmptyArchive);
        }

        let mut frames = Vec::with_capacity(total);

        // Keyframe.
        let mut delay_buf = [0u8; 4];
        self.input.read_exact(&mut delay_buf)?;
        let mut current = vec![0u8; expected];
        self.input.read_exact(&mut current)?;
        frames.push(RecordedFrame {
            data: current.clone(),
            delay_ms: u32::from_be_bytes(delay_buf),
            is_full_frame: true,
        });

        // Remaining frames.
        for index in 1..total {
            let mut tag = [0u8; 1];
            self.input.read_exact(&mut tag)?;
            self.input.read_exact(&mut delay_buf)?;
            let delay_ms = u32::from_be_bytes(delay_buf);
            let mut size_buf = [0u8; 4];
            self.input.read_exact(&mut size_buf)?;
            let payload_size = u32::from_be_bytes(size_buf) as usize;

            match tag[0] {
                FRAME_TYPE_FULL => {
                    if payload_size != expected {
                        return Err(AvoError::InvalidArchive(format!(
                            "frame {index}: full-frame payload of {payload_size} bytes"
                        )));
                    }
                    self.input.read_exact(&mut current)?;
                }
                FRAME_TYPE_DELTA => {
                    if payload_size > 0 {
                        let mut payload = vec![0u8; payload_size];
                        self.input.read_exact(&mut payload)?;
                        let changes = rle::decompress(&payload);
                        current = apply_changes(&current, &changes, width, height);
                    }
                    // A zero-length delta means "no change".
                }
                other => {
                    return Err(AvoError::InvalidArchive(format!(
                        "frame {index}: unknown frame type {other}"
                    )));
                }
            }

            frames.push(RecordedFrame {
                data: current.clone(),
                delay_ms,
                is_full_frame: true,
            });
        }

        Ok(frames)
    }
}

// ── Tests ────────────────────────────────────────────────────────
