//! Retry Policy
//!
//! Deterministic exponential backoff for transient generation failures.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::error::GenerationError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MULTIPLIER: u32 = 2;

/// Hook for perturbing backoff delays. The default applies none, which keeps
/// the delay sequence exactly reproducible.
pub trait Jitter: Send + Sync {
    fn apply(&self, attempt: u32, delay: Duration) -> Duration;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl Jitter for NoJitter {
    fn apply(&self, _attempt: u32, delay: Duration) -> Duration {
        delay
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait, then run the next attempt.
    RetryAfter(Duration),
    /// Transient failure but no attempts remain.
    Exhausted,
    /// The error is not retry-eligible.
    NotRetryable,
}

#[derive(Clone)]
pub struct RetryPolicy {
    base_delay: Duration,
    multiplier: u32,
    max_attempts: u32,
    max_delay: Option<Duration>,
    jitter: Arc<dyn Jitter>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("base_delay", &self.base_delay)
            .field("multiplier", &self.multiplier)
            .field("max_attempts", &self.max_attempts)
            .field("max_delay", &self.max_delay)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_delay: None,
            jitter: Arc::new(NoJitter),
        }
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    pub fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier.max(1);
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn with_jitter(mut self, jitter: Arc<dyn Jitter>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Delay to wait after failed attempt `attempt` (1-based).
    ///
    /// `base * multiplier^(attempt - 1)`, saturating, optionally capped.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.checked_pow(exponent).unwrap_or(u32::MAX);
        let mut delay = self.base_delay.saturating_mul(factor);
        if let Some(cap) = self.max_delay {
            delay = delay.min(cap);
        }
        self.jitter.apply(attempt, delay)
    }

    pub fn is_retryable(&self, error: &GenerationError) -> bool {
        error.is_transient()
    }

    pub fn decide(&self, attempt: u32, error: &GenerationError) -> RetryDecision {
        if !self.is_retryable(error) {
            RetryDecision::NotRetryable
        } else if attempt >= self.max_attempts {
            RetryDecision::Exhausted
        } else {
            RetryDecision::RetryAfter(self.next_delay(attempt))
        }
    }

    /// The full delay schedule between attempts.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts).map(|a| self.next_delay(a)).collect()
    }
}
