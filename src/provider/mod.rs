//! Host readings for the sampler.
//!
//! [`HostMetricsProvider`] is the production [`crate::core::HostProvider`],
//! built on `sysinfo`. With the `test-utils` feature, [`fake`] offers a
//! scripted provider for tests.

pub mod cpu;
pub mod disk;
pub mod host;
#[cfg(any(test, feature = "test-utils"))]
pub mod fake;

pub use host::HostMetricsProvider;

use std::time::Instant;

/// Turns a pair of monotonically growing byte counters into per-second rates.
#[derive(Debug, Default)]
pub struct CounterRate {
    last: Option<(u64, u64, Instant)>,
}

impl CounterRate {
    /// Records new counter values and returns the rates since the previous call.
    ///
    /// The first call only sets the baseline and reports zero. A counter that
    /// went backwards (an interface vanished) counts as zero.
    pub fn update(&mut self, a: u64, b: u64, now: Instant) -> (f64, f64) {
        let rates = match self.last {
            Some((last_a, last_b, at)) => {
                let secs = now.saturating_duration_since(at).as_secs_f64();
                if secs > 0.0 {
                    (
                        a.saturating_sub(last_a) as f64 / secs,
                        b.saturating_sub(last_b) as f64 / secs,
                    )
                } else {
                    (0.0, 0.0)
                }
            }
            None => (0.0, 0.0),
        };
        self.last = Some((a, b, now));
        rates
    }
}
