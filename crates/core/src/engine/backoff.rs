//! Exponential backoff for primary provider retries.

use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::ErrorKind;

/// What the worker does after a failed primary attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait, then try the primary again.
    RetryAfter(Duration),
    /// Stop using the primary.
    GiveUp(GiveUpReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    /// Every allowed attempt failed with a retryable error.
    Exhausted,
    /// The error says retrying the same provider is pointless.
    NonRetryable,
}

impl GiveUpReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            GiveUpReason::Exhausted => "exhausted",
            GiveUpReason::NonRetryable => "non_retryable",
        }
    }
}

/// Jitter-free capped exponential backoff: `min(base * 2^(n-1), max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total primary attempts allowed.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl BackoffPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    /// At least one primary attempt is always made.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Delay to wait after attempt `attempt` (1-based) failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Decide what follows a failed primary attempt number `attempt`.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if !kind.is_retryable() {
            RetryDecision::GiveUp(GiveUpReason::NonRetryable)
        } else if attempt < self.max_attempts() {
            RetryDecision::RetryAfter(self.delay_for(attempt))
        } else {
            RetryDecision::GiveUp(GiveUpReason::Exhausted)
        }
    }

    /// Every delay the policy would insert when all attempts fail.
    #[cfg(test)]
    pub(crate) fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts()).map(|n| self.delay_for(n)).collect()
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
