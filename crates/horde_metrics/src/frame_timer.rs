//! Frame timing against a fixed budget

use super::window::SampleWindow;
use std::time::{Duration, Instant};

pub struct FrameTimer {
    frame_start: Instant,
    budget: Duration,
    frame_times: SampleWindow<Duration>,
}

impl FrameTimer {
    pub fn new(capacity: usize, budget: Duration) -> Self {
        Self {
            frame_start: Instant::now(),
            budget,
            frame_times: SampleWindow::new(capacity),
        }
    }

    pub fn begin(&mut self) {
        self.frame_start = Instant::now();
    }

    /// Close the current frame and return its duration.
    pub fn end(&mut self) -> Duration {
        let elapsed = self.frame_start.elapsed();
        self.frame_times.push(elapsed);
        elapsed
    }

    /// True when the last completed frame ran past the budget.
    pub fn over_budget(&self) -> bool {
        self.frame_times.latest().is_some_and(|last| last > self.budget)
    }

    pub fn fps(&self) -> f64 {
        let avg = self.frame_times.average().as_secs_f64();
        if avg > 0.0 {
            1.0 / avg
        } else {
            0.0
        }
    }

    pub fn frame_time_ms(&self) -> f64 {
        self.frame_times.average().as_secs_f64() * 1000.0
    }

    pub fn frame_time_range_ms(&self) -> (f64, f64) {
        let (min, max) = self.frame_times.min_max();
        (min.as_secs_f64() * 1000.0, max.as_secs_f64() * 1000.0)
    }
}
