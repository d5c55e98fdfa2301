//! Horde Metrics - frame and pass instrumentation for the neighbor grid
//!
//! Provides timing and counting helpers that compile down to nothing
//! unless the `metrics` feature is enabled.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable metrics collection (default: disabled)
//!
//! # Usage
//!
//! ```ignore
//! use horde_metrics::{PassTimings, time_pass};
//!
//! let mut timings = PassTimings::new(120);
//! time_pass!(timings, "register", {
//!     // ... registration work ...
//! });
//! println!("register: {:?}", timings.average("register"));
//! ```

#[cfg(feature = "metrics")]
mod counters;
#[cfg(feature = "metrics")]
mod frame_timer;
#[cfg(feature = "metrics")]
mod pass_timings;
#[cfg(feature = "metrics")]
mod window;

#[cfg(feature = "metrics")]
pub use counters::PassCounters;
#[cfg(feature = "metrics")]
pub use frame_timer::FrameTimer;
#[cfg(feature = "metrics")]
pub use pass_timings::PassTimings;
#[cfg(feature = "metrics")]
pub use window::SampleWindow;

// ============================================================================
// Macros for conditional compilation
// ============================================================================

/// Execute code only when metrics are enabled
#[macro_export]
macro_rules! metrics {
    ($($tt:tt)*) => {
        #[cfg(feature = "metrics")]
        {
            $($tt)*
        }
    };
}

/// Time a named pass (zero-cost when metrics disabled)
#[macro_export]
macro_rules! time_pass {
    ($timings:expr, $name:expr, $body:block) => {{
        #[cfg(feature = "metrics")]
        let __out = $timings.time_pass($name, || $body);
        #[cfg(not(feature = "metrics"))]
        let __out = $body;
        __out
    }};
}

// ============================================================================
// No-op stubs when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
mod stubs {
    use std::time::Duration;

    pub struct FrameTimer;

    impl FrameTimer {
        pub fn new(_capacity: usize, _budget: Duration) -> Self { Self }
        pub fn begin(&mut self) {}
        pub fn end(&mut self) -> Duration { Duration::ZERO }
        pub fn over_budget(&self) -> bool { false }
        pub fn fps(&self) -> f64 { 0.0 }
        pub fn frame_time_ms(&self) -> f64 { 0.0 }
        pub fn frame_time_range_ms(&self) -> (f64, f64) { (0.0, 0.0) }
    }

    pub struct SampleWindow<T>(std::marker::PhantomData<T>);

    impl<T> SampleWindow<T> {
        pub fn new(_capacity: usize) -> Self { Self(std::marker::PhantomData) }
        pub fn push(&mut self, _sample: T) {}
        pub fn len(&self) -> usize { 0 }
        pub fn is_empty(&self) -> bool { true }
    }

    pub struct PassTimings;

    impl PassTimings {
        pub fn new(_capacity: usize) -> Self { Self }
        pub fn time_pass<F, R>(&mut self, _name: &'static str, f: F) -> R where F: FnOnce() -> R { f() }
        pub fn record(&mut self, _name: &'static str, _elapsed: Duration) {}
        pub fn last(&self, _name: &str) -> Duration { Duration::ZERO }
        pub fn average(&self, _name: &str) -> Duration { Duration::ZERO }
        pub fn iter(&self) -> impl Iterator<Item = (&'static str, Duration)> { std::iter::empty() }
    }

    pub struct PassCounters;

    impl PassCounters {
        pub fn new(_names: &[&'static str]) -> Self { Self }
        pub fn add(&self, _name: &str, _value: usize) {}
        pub fn get(&self, _name: &str) -> usize { 0 }
        pub fn reset(&self) {}
        pub fn iter(&self) -> impl Iterator<Item = (&'static str, usize)> { std::iter::empty() }
    }
}

#[cfg(not(feature = "metrics"))]
pub use stubs::{FrameTimer, PassCounters, PassTimings, SampleWindow};

impl Default for PassTimings {
    fn default() -> Self {
        Self::new(120)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_compiles_in_both_modes() {
        let mut timer = FrameTimer::new(60, std::time::Duration::from_millis(16));
        timer.begin();
        let _ = timer.end();

        let mut timings = PassTimings::new(8);
        let value = time_pass!(timings, "sum", { 1 + 2 });
        assert_eq!(value, 3);

        let counters = PassCounters::new(&["cells"]);
        counters.add("cells", 4);
        counters.reset();
        assert_eq!(counters.get("cells"), 0);
    }
}
