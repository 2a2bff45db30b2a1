//! Per-endpoint retry policy with capped backoff.

use std::time::Duration;

use crate::error::ConfigError;

/// How the delay grows between retries on the same endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DelayGrowth {
    /// `initial_delay * factor^attempt`
    Multiplicative(f64),
    /// `initial_delay + step * attempt`
    Additive(Duration),
}

impl Default for DelayGrowth {
    fn default() -> Self {
        Self::Multiplicative(2.0)
    }
}

/// Retry configuration applied to every endpoint of a fallback chain.
///
/// `max_attempts` counts attempts per endpoint, the first one included.
/// Zero behaves like one: the endpoint is tried once and never retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub delay_growth: DelayGrowth,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    /// One attempt per endpoint, no delay.
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::ZERO,
            delay_growth: DelayGrowth::default(),
            max_delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff: `max_attempts` tries per endpoint starting at
    /// `initial_delay`, doubling up to `max_delay`.
    pub fn exponential(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            delay_growth: DelayGrowth::Multiplicative(2.0),
            max_delay,
        }
    }

    /// Retry immediately, `max_attempts` tries per endpoint.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn with_growth(mut self, growth: DelayGrowth) -> Self {
        self.delay_growth = growth;
        self
    }

    /// Attempts actually made against one endpoint before falling through.
    pub fn attempts_per_endpoint(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Returns `true` if another attempt on the same endpoint is allowed
    /// after the 0-based `attempt` failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt.saturating_add(1) < self.attempts_per_endpoint()
    }

    /// Delay to wait after the 0-based `attempt` failed, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let grown = match self.delay_growth {
            DelayGrowth::Multiplicative(factor) => {
                let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
                let nanos = self.initial_delay.as_nanos() as f64 * factor.powi(exp);
                if nanos.is_finite() && nanos < u64::MAX as f64 {
                    Duration::from_nanos(nanos.round() as u64)
                } else {
                    self.max_delay
                }
            }
            DelayGrowth::Additive(step) => step
                .checked_mul(attempt)
                .and_then(|inc| self.initial_delay.checked_add(inc))
                .unwrap_or(self.max_delay),
        };
        grown.min(self.max_delay)
    }

    /// The full backoff schedule for one endpoint: one delay per retry.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.attempts_per_endpoint().saturating_sub(1)).map(|a| self.delay_for(a))
    }

    /// Reject policies that cannot produce a sane schedule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let DelayGrowth::Multiplicative(factor) = self.delay_growth {
            if !factor.is_finite() || factor < 1.0 {
                return Err(ConfigError::InvalidGrowth(factor));
            }
        }
        Ok(())
    }
}
