//! Exponential backoff with bounded, monotonic jitter

use std::time::Duration;

use contracts::RetryConfig;
use rand::Rng;

/// Backoff state for the retries of one event
///
/// Delays double from `base_delay` and are capped at `max_delay`. Jitter only
/// shortens a delay, and the result is clamped so successive delays never
/// decrease.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: f64,
    previous: Duration,
}

impl Backoff {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            base: config.base_delay(),
            max: config.max_delay(),
            jitter: config.jitter.clamp(0.0, 0.5),
            previous: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1 = first retry)
    pub fn next_delay(&mut self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(20);
        let raw = self.base.saturating_mul(2_u32.saturating_pow(exponent));
        let capped = raw.min(self.max);
        let delay = apply_jitter(capped, self.jitter)
            .max(self.previous)
            .min(self.max);
        self.previous = delay;
        delay
    }

    /// Start over for the next event
    pub fn reset(&mut self) {
        self.previous = Duration::ZERO;
    }
}

fn apply_jitter(delay: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 || delay.is_zero() {
        return delay;
    }
    let reduction = rand::rng().random_range(0.0..=jitter);
    delay.mul_f64(1.0 - reduction)
}
