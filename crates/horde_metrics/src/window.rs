//! Fixed-capacity rolling window of samples

use std::time::Duration;

pub struct SampleWindow<T> {
    samples: Vec<T>,
    capacity: usize,
    next: usize,
}

impl<T: Copy> SampleWindow<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
            next: 0,
        }
    }

    pub fn push(&mut self, sample: T) {
        if self.samples.len() < self.capacity {
            self.samples.push(sample);
        } else {
            self.samples[self.next] = sample;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    /// Most recently pushed sample.
    pub fn latest(&self) -> Option<T> {
        if self.samples.is_empty() {
            return None;
        }
        let idx = (self.next + self.capacity - 1) % self.capacity;
        self.samples.get(idx).copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.next = 0;
    }
}

impl SampleWindow<Duration> {
    pub fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let sum: Duration = self.samples.iter().sum();
        sum / self.samples.len() as u32
    }

    pub fn peak(&self) -> Duration {
        self.samples.iter().copied().max().unwrap_or(Duration::ZERO)
    }

    pub fn min_max(&self) -> (Duration, Duration) {
        let min = self.samples.iter().copied().min().unwrap_or(Duration::ZERO);
        (min, self.peak())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_overwrites_oldest() {
        let mut window = SampleWindow::new(3);
        window.push(Duration::from_millis(10));
        window.push(Duration::from_millis(20));
        window.push(Duration::from_millis(30));
        assert_eq!(window.average(), Duration::from_millis(20));

        window.push(Duration::from_millis(60));
        assert_eq!(window.len(), 3);
        assert_eq!(window.latest(), Some(Duration::from_millis(60)));
        assert_eq!(window.min_max(), (Duration::from_millis(20), Duration::from_millis(60)));
    }

    #[test]
    fn empty_window_reports_zero() {
        let window: SampleWindow<Duration> = SampleWindow::new(4);
        assert!(window.is_empty());
        assert_eq!(window.latest(), None);
        assert_eq!(window.average(), Duration::ZERO);
    }
}
