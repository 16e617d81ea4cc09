//! Exponential backoff with a jitter fraction

use rand::Rng;
use std::time::Duration;

/// Delay schedule: `initial_delay * multiplier^(attempt-1)`, capped at
/// `max_delay`, then spread by `jitter`
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: f64,
}

impl ExponentialBackoff {
    /// `jitter` is the randomization fraction: a delay `d` becomes a value
    /// drawn uniformly from `[d * (1 - jitter), d * (1 + jitter)]`.
    pub fn new(initial_delay: Duration, max_delay: Duration, multiplier: f64, jitter: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier: multiplier.max(1.0),
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Delay to wait after failed attempt `attempt` (1-indexed)
    pub fn delay(&self, attempt: u32) -> Duration {
        let capped = self.base_delay(attempt).min(self.max_delay);
        if self.jitter > 0.0 {
            self.spread(capped)
        } else {
            capped
        }
    }

    fn base_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let nanos = self.initial_delay.as_nanos() as f64 * self.multiplier.powi(exponent);
        // powi overflows to inf well before u64 nanos would
        if !nanos.is_finite() || nanos >= u64::MAX as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(nanos as u64)
    }

    fn spread(&self, delay: Duration) -> Duration {
        let factor = rand::thread_rng().gen_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        Duration::from_nanos((delay.as_nanos() as f64 * factor) as u64)
    }
}
