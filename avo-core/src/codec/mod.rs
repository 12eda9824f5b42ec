//! Pixel-delta codec: change detection and run-length serialization.
//!
//! | Module  | Purpose                                               |
//! |---------|-------------------------------------------------------|
//! | `delta` | Thresholded per-pixel comparison and best-effort apply |
//! | `rle`   | Fixed 8-byte-record serialization of change lists      |

pub mod delta;
pub mod rle;

pub use delta::{apply_changes, compare_frames, diff_percentage, PixelChange, PIXEL_THRESHOLD};
