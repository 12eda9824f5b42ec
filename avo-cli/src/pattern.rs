//! Synthetic frame source.
//!
//! Stands in for the camera (capture hardware is outside the core):
//! a fixed color gradient with a bright bar sweeping across it, so
//! consecutive frames always carry a delta worth encoding.

use avo_core::{frame_len, RgbFrame};

/// Width of the sweeping bar in pixels.
const BAR_WIDTH: u32 = 16;

/// Deterministic moving-gradient generator.
pub struct PatternGenerator {
    width: u32,
    height: u32,
    tick: u32,
}

impl PatternGenerator {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tick: 0,
        }
    }

    /// Produce the next frame in the sequence.
    pub fn next_frame(&mut self) -> RgbFrame {
        let (w, h) = (self.width, self.height);
        let bar_start = (self.tick * 4) % w.max(1);
        let mut data = Vec::with_capacity(frame_len(w, h));

        for y in 0..h {
            for x in 0..w {
                let in_bar = (x + w - bar_start) % w < BAR_WIDTH;
                if in_bar {
                    data.extend_from_slice(&[235, 235, 235]);
                } else {
                    data.push((x * 255 / w) as u8);
                    data.push((y * 100 / h.max(1)) as u8);
                    data.push(50);
                }
            }
        }

        self.tick = self.tick.wrapping_add(1);
        RgbFrame::new(w, h, data)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use avo_core::compare_frames;

    #[test]
    fn frames_are_well_formed() {
        let mut gen = PatternGenerator::new(64, 48);
        let frame = gen.next_frame();
        assert!(frame.is_well_formed());
        assert_eq!(frame.data.len(), frame_len(64, 48));
    }

    #[test]
    fn consecutive_frames_differ() {
        let mut gen = PatternGenerator::new(64, 48);
        let first = gen.next_frame();
        let second = gen.next_frame();
        let changes = compare_frames(&first.data, &second.data, 64, 48);
        assert!(!changes.is_empty(), "the bar must move every frame");
    }
}
