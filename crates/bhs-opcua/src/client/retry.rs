// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Reconnect retry policy.
//!
//! After a keep-alive failure the session manager waits, tries to reconnect,
//! and repeats on failure. [`ReconnectPolicy`] decides how long to wait before
//! each attempt and when to give up. The default waits a fixed 10 seconds
//! and never gives up.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, OpcUaError};
use crate::types::humantime_serde;

// =============================================================================
// RetryStrategy
// =============================================================================

/// Strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Fixed delay between retries.
    #[default]
    Fixed,

    /// Linear backoff (delay * attempt).
    Linear,

    /// Exponential backoff (delay * 2^attempt).
    Exponential,
}

impl RetryStrategy {
    /// Calculates the delay for a given zero-based attempt.
    pub fn delay(&self, base_delay: Duration, attempt: u32) -> Duration {
        match self {
            Self::Fixed => base_delay,
            Self::Linear => base_delay.saturating_mul(attempt.saturating_add(1)),
            Self::Exponential => base_delay.saturating_mul(2u32.saturating_pow(attempt)),
        }
    }
}

impl fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed => write!(f, "Fixed"),
            Self::Linear => write!(f, "Linear"),
            Self::Exponential => write!(f, "Exponential"),
        }
    }
}

// =============================================================================
// ReconnectPolicy
// =============================================================================

/// When and how often to retry a lost session.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use bhs_opcua::client::{ReconnectPolicy, RetryStrategy};
///
/// let policy = ReconnectPolicy::default();
/// assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(10));
/// assert!(policy.allows_attempt(1_000_000));
///
/// let policy = ReconnectPolicy::fixed(Duration::from_secs(1))
///     .with_strategy(RetryStrategy::Exponential)
///     .with_max_delay(Duration::from_secs(4))
///     .with_max_attempts(3);
/// assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(4));
/// assert!(!policy.allows_attempt(3));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Base delay before an attempt.
    #[serde(default = "default_delay")]
    #[serde(with = "humantime_serde")]
    pub delay: Duration,

    /// Upper bound on the computed delay.
    #[serde(default = "default_max_delay")]
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    /// How the delay grows between attempts.
    #[serde(default)]
    pub strategy: RetryStrategy,

    /// Attempts before giving up; `None` retries until disconnected.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

fn default_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(300)
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: default_delay(),
            max_delay: default_max_delay(),
            strategy: RetryStrategy::Fixed,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Creates an unbounded policy with a fixed `delay`.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_delay: delay.max(default_max_delay()),
            ..Default::default()
        }
    }

    /// Sets the maximum number of attempts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the retry strategy.
    pub fn with_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Calculates the delay before a given zero-based attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.strategy.delay(self.delay, attempt);
        delay.min(self.max_delay)
    }

    /// Returns `true` if a zero-based `attempt` is still permitted.
    #[inline]
    pub fn allows_attempt(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }

    /// Returns `true` if the policy never gives up.
    #[inline]
    pub fn is_unbounded(&self) -> bool {
        self.max_attempts.is_none()
    }

    /// Validates the policy.
    pub fn validate(&self) -> Result<(), OpcUaError> {
        if self.max_attempts == Some(0) {
            return Err(OpcUaError::configuration(
                ConfigurationError::invalid_retry_policy("max_attempts must be at least 1"),
            ));
        }
        if self.max_delay < self.delay {
            return Err(OpcUaError::configuration(
                ConfigurationError::invalid_retry_policy("max_delay must not be below delay"),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_strategy_delay() {
        let base = Duration::from_millis(100);
        assert_eq!(RetryStrategy::Fixed.delay(base, 3), base);
        assert_eq!(RetryStrategy::Linear.delay(base, 2), Duration::from_millis(300));
        assert_eq!(RetryStrategy::Exponential.delay(base, 3), Duration::from_millis(800));
        assert_eq!(RetryStrategy::Exponential.to_string(), "Exponential");
    }

    #[test]
    fn test_default_policy_is_unbounded_fixed() {
        let policy = ReconnectPolicy::default();
        assert!(policy.is_unbounded());
        assert_eq!(policy.strategy, RetryStrategy::Fixed);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(50), Duration::from_secs(10));
        assert!(policy.allows_attempt(u32::MAX - 1));
        policy.validate().unwrap();
    }

    #[test]
    fn test_bounded_policy() {
        let policy = ReconnectPolicy::fixed(Duration::from_secs(1)).with_max_attempts(2);
        assert!(policy.allows_attempt(0));
        assert!(policy.allows_attempt(1));
        assert!(!policy.allows_attempt(2));
    }

    #[test]
    fn test_exponential_clamped() {
        let policy = ReconnectPolicy::fixed(Duration::from_secs(1))
            .with_strategy(RetryStrategy::Exponential)
            .with_max_delay(Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(10));
    }

    #[test]
    fn test_policy_validation() {
        assert!(ReconnectPolicy::default().with_max_attempts(0).validate().is_err());
        assert!(ReconnectPolicy::default()
            .with_max_delay(Duration::from_secs(1))
            .validate()
            .is_err());
    }
}
