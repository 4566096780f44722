//! Randomised inter-cycle delay.
//!
//! Delays are drawn from an exponential distribution with the configured
//! mean and clamped to `[min, max]`, so independent deployments drift apart
//! instead of hitting the reboot API in lockstep.

use remedy_common::config::SchedulerConfig;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct JitteredDelay {
    min: Duration,
    expected: Duration,
    max: Duration,
    rng: fastrand::Rng,
}

impl JitteredDelay {
    pub fn new(min: Duration, expected: Duration, max: Duration) -> Self {
        Self::with_rng(min, expected, max, fastrand::Rng::new())
    }

    /// Deterministic sequence for tests.
    pub fn with_seed(min: Duration, expected: Duration, max: Duration, seed: u64) -> Self {
        Self::with_rng(min, expected, max, fastrand::Rng::with_seed(seed))
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(config.min_delay, config.expected_delay, config.max_delay)
    }

    fn with_rng(min: Duration, expected: Duration, max: Duration, rng: fastrand::Rng) -> Self {
        Self {
            min,
            expected,
            max: max.max(min),
            rng,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        // 1 - u is in (0, 1], so the logarithm is finite.
        let u = self.rng.f64();
        let draw = (1.0 - u).ln().abs() * self.expected.as_secs_f64();
        Duration::try_from_secs_f64(draw)
            .unwrap_or(self.max)
            .clamp(self.min, self.max)
    }
}
