//! Tunables for the relay core.
//!
//! Values are plain data with defaults; the gateway binary fills them from
//! environment variables and calls [`RelayConfig::validate`] before use.

use std::time::Duration;

use crate::error::RelayError;

/// Reconnect backoff for watch subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay before the first retry after a failure.
    pub initial: Duration,
    /// Upper bound for any single delay.
    pub max: Duration,
    /// Growth factor applied after each consecutive failure.
    pub multiplier: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(250),
            max: Duration::from_secs(30),
            multiplier: 2,
        }
    }
}

/// Cooldown policy for the mutation rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Minimum spacing between two allowed actions on the same key.
    pub cooldown: Duration,
    /// Keys idle for longer than `cooldown * retention_factor` are evicted.
    pub retention_factor: u32,
    /// How often the eviction sweep runs.
    pub sweep_period: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_millis(300),
            retention_factor: 10,
            sweep_period: Duration::from_secs(60),
        }
    }
}

/// Settings shared by the hub and the watch relays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    /// Frames buffered per subscriber before it is treated as gone.
    pub subscriber_queue_capacity: usize,
    /// Watch reconnect backoff.
    pub backoff: BackoffConfig,
    /// Mutation cooldown policy.
    pub rate_limit: RateLimitConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            subscriber_queue_capacity: 256,
            backoff: BackoffConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Reject values that would hot-loop the relays or stall subscribers.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.subscriber_queue_capacity == 0 {
            return Err(RelayError::InvalidConfig(
                "subscriber queue capacity must be at least 1".to_owned(),
            ));
        }
        if self.backoff.initial.is_zero() {
            return Err(RelayError::InvalidConfig(
                "initial backoff must be greater than zero".to_owned(),
            ));
        }
        if self.backoff.max < self.backoff.initial {
            return Err(RelayError::InvalidConfig(format!(
                "max backoff {:?} is below initial backoff {:?}",
                self.backoff.max, self.backoff.initial
            )));
        }
        if self.backoff.multiplier == 0 {
            return Err(RelayError::InvalidConfig(
                "backoff multiplier must be at least 1".to_owned(),
            ));
        }
        if self.rate_limit.sweep_period.is_zero() {
            return Err(RelayError::InvalidConfig(
                "rate limit sweep period must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }
}
