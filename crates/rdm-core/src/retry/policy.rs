use std::time::Duration;

use rand::Rng;

use super::classify::ErrorClass;

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff with symmetric jitter and a bounded attempt count.
///
/// `delay(attempt) = base_delay * 2^(attempt-1) * (1 ± jitter)`. The policy is
/// a pure function of the attempt number and the random source it is given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Base delay for backoff.
    pub base_delay: Duration,
    /// Jitter fraction in `[0, 1]`; 0.2 means ±20%.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// True while another attempt fits in the budget. `attempt` is 1-based.
    pub fn may_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Backoff before the attempt following `attempt`.
    pub fn backoff<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let exp = 1u32 << attempt.saturating_sub(1).min(16);
        let raw = self.base_delay.saturating_mul(exp);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return raw;
        }
        let factor = rng.gen_range((1.0 - jitter)..=(1.0 + jitter));
        raw.mul_f64(factor)
    }

    /// Decide what to do after `attempt` failed with `class`.
    pub fn decide<R: Rng + ?Sized>(&self, attempt: u32, class: ErrorClass, rng: &mut R) -> RetryDecision {
        if !class.is_retryable() || !self.may_retry(attempt) {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.backoff(attempt, rng))
    }
}
