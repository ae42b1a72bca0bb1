//! Frame timing.

use std::time::{Duration, Instant};

/// High-resolution timer for measuring elapsed time.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
        }
    }

    /// Get the total elapsed time since the timer was created or reset.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get the time elapsed since the last call to `tick()`.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        delta
    }

    /// Reset the timer to the current time.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last_tick = now;
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts presented frames and reports an average rate once per interval.
#[derive(Debug)]
pub struct FrameRateCounter {
    timer: Timer,
    interval: Duration,
    frames: u32,
}

impl FrameRateCounter {
    pub fn new(interval: Duration) -> Self {
        Self {
            timer: Timer::new(),
            interval,
            frames: 0,
        }
    }

    /// Records one frame. Returns the average frames per second when the
    /// reporting interval has elapsed, then starts a new interval.
    pub fn record_frame(&mut self) -> Option<f32> {
        self.frames += 1;
        let elapsed = self.timer.elapsed();
        if elapsed < self.interval {
            return None;
        }

        let fps = self.frames as f32 / elapsed.as_secs_f32();
        self.frames = 0;
        self.timer.reset();
        Some(fps)
    }

    /// Frames recorded in the current interval.
    pub fn frames(&self) -> u32 {
        self.frames
    }
}
