//! Wall-clock playback of a recorded frame sequence.
//!
//! Reproduces the original capture cadence from the per-frame delays.
//! Drift does not accumulate: each deadline is baselined on the
//! *actual* display start of the previous frame, not its intended one,
//! so a slow consumer shifts the schedule instead of compressing it.
//!
//! The scheduler runs on the caller's thread; a cloneable
//! [`PlaybackHandle`] pauses, resumes or cancels it from elsewhere.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::archive::RecordedFrame;

// ── Control state ────────────────────────────────────────────────

struct PlaybackState {
    paused: Mutex<bool>,
    signal: Condvar,
    cancelled: AtomicBool,
}

/// Remote control for a running [`PlaybackScheduler`].
#[derive(Clone)]
pub struct PlaybackHandle {
    state: Arc<PlaybackState>,
}

impl PlaybackHandle {
    /// Block the scheduler before its next frame.
    pub fn pause(&self) {
        *self.state.paused.lock().unwrap() = true;
        self.state.signal.notify_all();
    }

    /// Resume a paused scheduler; the pause duration is not replayed.
    pub fn resume(&self) {
        *self.state.paused.lock().unwrap() = false;
        self.state.signal.notify_all();
    }

    /// Stop playback before the next frame.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
        self.state.signal.notify_all();
    }

    /// Whether the scheduler is currently paused.
    pub fn is_paused(&self) -> bool {
        *self.state.paused.lock().unwrap()
    }
}

// ── PlaybackScheduler ────────────────────────────────────────────

/// Drives a consumer through a frame list at the recorded cadence.
pub struct PlaybackScheduler {
    state: Arc<PlaybackState>,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self {
            state: Arc::new(PlaybackState {
                paused: Mutex::new(false),
                signal: Condvar::new(),
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    /// A handle for pausing, resuming or cancelling from another thread.
    pub fn handle(&self) -> PlaybackHandle {
        PlaybackHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Play every frame, blocking until the sequence (including the
    /// last frame's delay) has elapsed or the handle cancels.
    ///
    /// For each frame: wait out any pause (rebasing the deadline so the
    /// pause is not double-counted), sleep until the deadline, hand the
    /// frame to `consumer`, and schedule the next deadline at
    /// `display_start + delay_ms`.
    pub fn play<F>(&self, frames: &[RecordedFrame], mut consumer: F)
    where
        F: FnMut(&RecordedFrame),
    {
        let mut next_frame_at = Instant::now();

        for frame in frames {
            if self.state.cancelled.load(Ordering::Acquire) {
                return;
            }
            if self.wait_while_paused() {
                next_frame_at = Instant::now();
            }
            if self.state.cancelled.load(Ordering::Acquire) {
                return;
            }

            sleep_until(next_frame_at);

            let display_start = Instant::now();
            consumer(frame);
            next_frame_at = display_start + Duration::from_millis(u64::from(frame.delay_ms));
        }

        // Honor the last frame's delay so total wall-clock time equals
        // the recorded sum.
        if !self.state.cancelled.load(Ordering::Acquire) {
            sleep_until(next_frame_at);
        }
    }

    /// Block while paused. Returns whether any pause happened, in which
    /// case the caller rebases its deadline.
    fn wait_while_paused(&self) -> bool {
        let mut paused = self.state.paused.lock().unwrap();
        if !*paused {
            return false;
        }
        while *paused && !self.state.cancelled.load(Ordering::Acquire) {
            paused = self.state.signal.wait(paused).unwrap();
        }
        true
    }
}

impl Default for PlaybackScheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn sleep_until(deadline: Instant) {
    let now = Instant::now();
    if deadline > now {
        std::thread::sleep(deadline - now);
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(delays: &[u32]) -> Vec<RecordedFrame> {
        delays
            .iter()
            .map(|&delay_ms| RecordedFrame {
                data: vec![0u8; 12],
                delay_ms,
                is_full_frame: true,
            })
            .collect()
    }

    #[test]
    fn total_elapsed_matches_recorded_delays() {
        let scheduler = PlaybackScheduler::new();
        let sequence = frames(&[0, 20, 20, 20, 20]);
        let expected: u64 = sequence.iter().map(|f| u64::from(f.delay_ms)).sum();

        let mut shown = 0;
        let started = Instant::now();
        scheduler.play(&sequence, |_| shown += 1);
        let elapsed = started.elapsed();

        assert_eq!(shown, 5);
        assert!(elapsed >= Duration::from_millis(expected));
        // Generous ceiling: scheduling jitter, not drift.
        assert!(elapsed < Duration::from_millis(expected + 150));
    }

    #[test]
    fn cancel_stops_playback_early() {
        let scheduler = PlaybackScheduler::new();
        let handle = scheduler.handle();
        let sequence = frames(&[50; 100]);

        let mut shown = 0;
        scheduler.play(&sequence, |_| {
            shown += 1;
            if shown == 3 {
                handle.cancel();
            }
        });
        assert_eq!(shown, 3);
    }

    #[test]
    fn pause_is_not_double_counted() {
        let scheduler = PlaybackScheduler::new();
        let handle = scheduler.handle();
        let sequence = frames(&[10, 10, 10]);

        handle.pause();
        let resumer = {
            let handle = handle.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(120));
                handle.resume();
            })
        };

        let started = Instant::now();
        scheduler.play(&sequence, |_| {});
        let elapsed = started.elapsed();
        resumer.join().unwrap();

        // 120 ms pause + 30 ms of delays, but no replay of the pause.
        assert!(elapsed >= Duration::from_millis(150));
        assert!(elapsed < Duration::from_millis(400));
    }
}
