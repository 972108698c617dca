//! Retry schedule and attempt tracking
//!
//! The executor drives retries as an explicit state machine: a
//! [`RetryState`] counts attempts, answers whether another attempt is
//! allowed, and hands out the delay for the next wait. Delays carry no
//! jitter so schedules are reproducible.

use std::time::Duration;

use crate::document::{RetryPolicy, RetryStrategy};

/// Delay table derived from an operation's retry policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySchedule {
    strategy: RetryStrategy,
    max_retries: u32,
    base_delay: Duration,
}

impl RetrySchedule {
    /// Single attempt, no waits
    pub fn no_retry() -> Self {
        Self {
            strategy: RetryStrategy::None,
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Schedule for an optional policy; absent means a single attempt
    pub fn from_policy(policy: Option<&RetryPolicy>) -> Self {
        match policy {
            Some(policy) => Self {
                strategy: policy.strategy,
                max_retries: policy.effective_max_retries(),
                base_delay: policy.base_delay(),
            },
            None => Self::no_retry(),
        }
    }

    /// Retries permitted after the first attempt
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Upper bound on sends
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Wait before retry `retry` (1-indexed)
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let retry = retry.max(1);
        match self.strategy {
            RetryStrategy::None => Duration::ZERO,
            RetryStrategy::Fixed => self.base_delay,
            RetryStrategy::Linear => self.base_delay.saturating_mul(retry),
            RetryStrategy::Exponential => {
                let factor = 2u32.checked_pow(retry - 1).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor)
            }
        }
    }
}

/// Attempt tracker for one call
#[derive(Debug)]
pub struct RetryState {
    schedule: RetrySchedule,
    retries: u32,
    last_error: Option<String>,
}

impl RetryState {
    pub fn new(schedule: RetrySchedule) -> Self {
        Self {
            schedule,
            retries: 0,
            last_error: None,
        }
    }

    /// Whether another send is allowed after a retryable failure
    pub fn can_retry(&self) -> bool {
        self.retries < self.schedule.max_retries
    }

    /// Record a failed attempt that will be retried; returns the wait
    pub fn begin_retry(&mut self, error: impl Into<String>) -> Duration {
        self.retries += 1;
        self.last_error = Some(error.into());
        self.schedule.delay_for_retry(self.retries)
    }

    /// Retries spent so far
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Current attempt number (1-indexed)
    pub fn attempt(&self) -> u32 {
        self.retries + 1
    }

    /// Retries still available
    pub fn remaining(&self) -> u32 {
        self.schedule.max_retries.saturating_sub(self.retries)
    }

    /// Error that triggered the most recent retry
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
