//! Wall-clock timer driving animation and frame-rate reports.

use std::time::{Duration, Instant};

/// How often [`Timer::frame`] reports a frame rate.
const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Monotonic timer started at construction.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_report: Instant,
    frames_since_report: u32,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_report: now,
            frames_since_report: 0,
        }
    }

    /// Total time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Seconds since the timer was created.
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// A value oscillating in `[0, 1]` with the elapsed time.
    ///
    /// Used for the animated clear color.
    pub fn pulse(&self) -> f32 {
        pulse_at(self.elapsed_secs())
    }

    /// Counts a presented frame.
    ///
    /// Returns the average frames per second once per report interval,
    /// `None` otherwise.
    pub fn frame(&mut self) -> Option<f32> {
        self.frames_since_report += 1;
        let now = Instant::now();
        let window = now - self.last_report;
        if window < REPORT_INTERVAL {
            return None;
        }

        let fps = self.frames_since_report as f32 / window.as_secs_f32();
        self.frames_since_report = 0;
        self.last_report = now;
        Some(fps)
    }

    /// Reset the timer to the current time.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

fn pulse_at(secs: f32) -> f32 {
    ((secs.sin() + 1.0) * 0.5).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pulse_range() {
        for i in 0..1000 {
            let v = pulse_at(i as f32 * 0.037);
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_pulse_known_points() {
        assert!((pulse_at(0.0) - 0.5).abs() < 1e-6);
        assert!((pulse_at(std::f32::consts::FRAC_PI_2) - 1.0).abs() < 1e-6);
        assert!(pulse_at(3.0 * std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn test_frame_report_waits_for_interval() {
        let mut timer = Timer::new();
        assert!(timer.frame().is_none());
        assert!(timer.frame().is_none());
    }

    #[test]
    fn test_reset_restarts_elapsed() {
        let mut timer = Timer::new();
        std::thread::sleep(Duration::from_millis(5));
        timer.reset();
        assert!(timer.elapsed() < Duration::from_millis(5));
    }
}
