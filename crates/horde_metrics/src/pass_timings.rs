//! Rolling timings for the named passes of a frame

use super::window::SampleWindow;
use std::time::{Duration, Instant};

pub struct PassTimings {
    capacity: usize,
    // A frame has a handful of passes; linear lookup beats hashing here.
    passes: Vec<(&'static str, SampleWindow<Duration>)>,
}

impl PassTimings {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            passes: Vec::new(),
        }
    }

    pub fn time_pass<F, R>(&mut self, name: &'static str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        self.record(name, start.elapsed());
        result
    }

    pub fn record(&mut self, name: &'static str, elapsed: Duration) {
        match self.passes.iter_mut().find(|(pass, _)| *pass == name) {
            Some((_, window)) => window.push(elapsed),
            None => {
                let mut window = SampleWindow::new(self.capacity);
                window.push(elapsed);
                self.passes.push((name, window));
            }
        }
    }

    pub fn last(&self, name: &str) -> Duration {
        self.window(name)
            .and_then(|window| window.latest())
            .unwrap_or(Duration::ZERO)
    }

    pub fn average(&self, name: &str) -> Duration {
        self.window(name)
            .map(|window| window.average())
            .unwrap_or(Duration::ZERO)
    }

    /// (pass, rolling average) in first-recorded order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Duration)> + '_ {
        self.passes
            .iter()
            .map(|(name, window)| (*name, window.average()))
    }

    pub fn reset(&mut self) {
        self.passes.clear();
    }

    fn window(&self, name: &str) -> Option<&SampleWindow<Duration>> {
        self.passes
            .iter()
            .find(|(pass, _)| *pass == name)
            .map(|(_, window)| window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_first_seen_order() {
        let mut timings = PassTimings::new(4);
        timings.record("reset", Duration::from_micros(100));
        timings.record("register", Duration::from_micros(300));
        timings.record("reset", Duration::from_micros(300));

        let names: Vec<_> = timings.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["reset", "register"]);
        assert_eq!(timings.average("reset"), Duration::from_micros(200));
        assert_eq!(timings.last("reset"), Duration::from_micros(300));
        assert_eq!(timings.average("missing"), Duration::ZERO);
    }

    #[test]
    fn time_pass_returns_closure_value() {
        let mut timings = PassTimings::new(4);
        let value = timings.time_pass("work", || 7);
        assert_eq!(value, 7);
        assert_eq!(timings.iter().count(), 1);
    }
}
