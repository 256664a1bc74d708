//! Frame clock for the simulation loop.
//!
//! Splits each frame's delta into fixed physics steps and keeps a rolling
//! average of frame times. The delta either comes from the wall clock or is
//! the fixed frame time when running unpaced.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Fixed physics rate.
const FIXED_DT: f32 = 1.0 / 60.0;

/// Largest delta fed to the accumulator.
const MAX_DT: f32 = 0.25;

/// Upper bound on fixed steps per frame.
const MAX_STEPS: u32 = 10;

/// Frame samples kept for averaging.
const MAX_SAMPLES: usize = 120;

/// Frame timing manager.
#[derive(Debug)]
pub struct FrameClock {
    frame_time: Duration,
    realtime: bool,
    last_frame: Instant,
    accumulator: f32,
    frame_times: VecDeque<f32>,
    frames: u64,
}

impl FrameClock {
    /// Creates a clock for `target_fps`. When `realtime` is false every
    /// frame advances by exactly one frame time and nothing sleeps.
    #[must_use]
    pub fn new(target_fps: u32, realtime: bool) -> Self {
        Self {
            frame_time: Duration::from_secs_f64(1.0 / f64::from(target_fps.max(1))),
            realtime,
            last_frame: Instant::now(),
            accumulator: 0.0,
            frame_times: VecDeque::with_capacity(MAX_SAMPLES),
            frames: 0,
        }
    }

    /// Fixed physics step in seconds.
    #[must_use]
    pub const fn fixed_dt(&self) -> f32 {
        FIXED_DT
    }

    /// Frames begun so far.
    #[must_use]
    pub const fn frames(&self) -> u64 {
        self.frames
    }

    /// Starts a frame and returns its delta in seconds.
    pub fn begin_frame(&mut self) -> f32 {
        let now = Instant::now();
        let dt = if self.realtime {
            (now - self.last_frame).as_secs_f32()
        } else {
            self.frame_time.as_secs_f32()
        };
        self.last_frame = now;
        self.frames += 1;

        let dt = dt.min(MAX_DT);
        self.frame_times.push_back(dt);
        if self.frame_times.len() > MAX_SAMPLES {
            self.frame_times.pop_front();
        }
        dt
    }

    /// Adds `dt` to the accumulator and returns how many fixed steps to run.
    pub fn accumulate(&mut self, dt: f32) -> u32 {
        self.accumulator += dt;
        let mut count = 0;
        while self.accumulator >= FIXED_DT && count < MAX_STEPS {
            self.accumulator -= FIXED_DT;
            count += 1;
        }

        // Still behind after the cap: drop the backlog
        if self.accumulator > FIXED_DT * 2.0 {
            self.accumulator = 0.0;
        }
        count
    }

    /// Sleeps for what is left of the frame when pacing against the wall clock.
    pub fn sleep_remainder(&self) {
        if !self.realtime {
            return;
        }
        let elapsed = self.last_frame.elapsed();
        if elapsed < self.frame_time {
            std::thread::sleep(self.frame_time - elapsed);
        }
    }

    /// Average frame time in milliseconds over recent frames.
    #[must_use]
    pub fn average_frame_ms(&self) -> f32 {
        if self.frame_times.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.frame_times.iter().sum();
        sum / self.frame_times.len() as f32 * 1000.0
    }

    /// Frames per second implied by the average frame time.
    #[must_use]
    pub fn fps(&self) -> f32 {
        let ms = self.average_frame_ms();
        if ms > 0.0 {
            1000.0 / ms
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpaced_frames_use_fixed_delta() {
        let mut clock = FrameClock::new(30, false);
        let dt = clock.begin_frame();
        assert!((dt - 1.0 / 30.0).abs() < 1e-6);
        assert_eq!(clock.frames(), 1);
        assert!((clock.fps() - 30.0).abs() < 0.01);
    }

    #[test]
    fn test_accumulate_splits_into_fixed_steps() {
        let mut clock = FrameClock::new(60, false);
        assert_eq!(clock.accumulate(FIXED_DT * 0.5), 0);
        assert_eq!(clock.accumulate(FIXED_DT * 0.6), 1);
        assert_eq!(clock.accumulate(FIXED_DT * 2.0), 2);
    }

    #[test]
    fn test_accumulate_caps_steps_and_drops_backlog() {
        let mut clock = FrameClock::new(60, false);
        assert_eq!(clock.accumulate(1.0), MAX_STEPS);
        assert_eq!(clock.accumulate(0.0), 0);
    }

    #[test]
    fn test_delta_is_clamped() {
        let mut clock = FrameClock::new(1, false);
        assert_eq!(clock.begin_frame(), MAX_DT);
    }

    #[test]
    fn test_empty_average() {
        let clock = FrameClock::new(60, true);
        assert_eq!(clock.average_frame_ms(), 0.0);
        assert_eq!(clock.fps(), 0.0);
    }
}
