//! Runtime policy attached to an operation

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on declared retries
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Declared runtime policy for one operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailPolicy {
    /// Retry behaviour for retryable failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,

    /// Per-attempt timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "timeout_ms")]
    pub timeout_ms: Option<u64>,

    /// Declared side-effect class (descriptive)
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "side_effect")]
    pub side_effect: Option<SideEffect>,

    /// Client-side rate limit
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "rate_limit")]
    pub rate_limit: Option<RateLimit>,
}

impl GuardrailPolicy {
    /// Policy with the given retry configuration
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Set the per-attempt timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Set the side-effect class
    pub fn with_side_effect(mut self, side_effect: SideEffect) -> Self {
        self.side_effect = Some(side_effect);
        self
    }

    /// Set the rate limit
    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    /// Per-attempt timeout, if declared
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Delay growth strategy
    #[serde(default)]
    pub strategy: RetryStrategy,

    /// Maximum number of retries after the first attempt
    #[serde(default, alias = "max_retries")]
    pub max_retries: u32,

    /// Base delay in milliseconds
    #[serde(default = "default_base_delay_ms", alias = "base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    1000
}

impl RetryPolicy {
    /// Create a retry policy, clamping `max_retries` into 0..=10
    pub fn new(strategy: RetryStrategy, max_retries: u32, base_delay: Duration) -> Self {
        Self {
            strategy,
            max_retries: max_retries.min(MAX_RETRIES_LIMIT),
            base_delay_ms: base_delay.as_millis() as u64,
        }
    }

    /// Exponential backoff
    pub fn exponential(max_retries: u32, base_delay: Duration) -> Self {
        Self::new(RetryStrategy::Exponential, max_retries, base_delay)
    }

    /// Linear backoff
    pub fn linear(max_retries: u32, base_delay: Duration) -> Self {
        Self::new(RetryStrategy::Linear, max_retries, base_delay)
    }

    /// Constant delay
    pub fn fixed(max_retries: u32, base_delay: Duration) -> Self {
        Self::new(RetryStrategy::Fixed, max_retries, base_delay)
    }

    /// Base delay as a duration
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Retries actually permitted by this policy
    ///
    /// A `none` strategy never retries, whatever `max_retries` says.
    pub fn effective_max_retries(&self) -> u32 {
        match self.strategy {
            RetryStrategy::None => 0,
            _ => self.max_retries.min(MAX_RETRIES_LIMIT),
        }
    }
}

/// Delay growth strategy between attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    #[default]
    None,
    Fixed,
    Linear,
    Exponential,
}

impl std::fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RetryStrategy::None => "none",
            RetryStrategy::Fixed => "fixed",
            RetryStrategy::Linear => "linear",
            RetryStrategy::Exponential => "exponential",
        };
        f.write_str(name)
    }
}

/// Declared side-effect class of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    /// No state change on the server
    ReadOnly,
    /// Repeating the call has the same effect as calling once
    Idempotent,
    /// Every call may change server state
    NonIdempotent,
}

impl SideEffect {
    /// Human label used in tool descriptions
    pub fn label(&self) -> &'static str {
        match self {
            SideEffect::ReadOnly => "read-only",
            SideEffect::Idempotent => "idempotent",
            SideEffect::NonIdempotent => "non-idempotent",
        }
    }
}

/// Sliding-window rate limit descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    /// Requests allowed per window
    #[serde(alias = "max_requests")]
    pub max_requests: u32,

    /// Window length in milliseconds
    #[serde(alias = "window_ms")]
    pub window_ms: u64,
}

impl RateLimit {
    /// Create a rate limit of `max_requests` per `window`
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window_ms: window.as_millis() as u64,
        }
    }

    /// Window length
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}
