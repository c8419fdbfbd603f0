//! Exponential reconnect backoff for watch subscriptions.
//!
//! The delay doubles (by default) after every consecutive failure up to a
//! ceiling, and returns to the initial value once a subscription proves
//! live again.

use std::time::Duration;

use crate::config::BackoffConfig;

/// Backoff state for one relay.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
    attempt: u32,
}

impl Backoff {
    /// Start a fresh backoff sequence.
    pub const fn new(config: BackoffConfig) -> Self {
        Self {
            current: config.initial,
            config,
            attempt: 0,
        }
    }

    /// Delay to wait before the next attempt; advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.attempt = self.attempt.saturating_add(1);
        self.current = self
            .current
            .saturating_mul(self.config.multiplier)
            .min(self.config.max);
        delay
    }

    /// The first delay of a sequence; also the shortest lifetime after
    /// which a subscription counts as healthy.
    pub const fn initial(&self) -> Duration {
        self.config.initial
    }

    /// Number of delays handed out since the last reset.
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Return to the initial delay.
    pub const fn reset(&mut self) {
        self.current = self.config.initial;
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BackoffConfig {
        BackoffConfig {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(1000),
            multiplier: 2,
        }
    }

    #[test]
    fn grows_exponentially_to_ceiling() {
        let mut backoff = Backoff::new(config());
        let delays: Vec<u128> = (0..6).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
        assert_eq!(backoff.attempt(), 6);
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut backoff = Backoff::new(config());
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.initial(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn multiplier_of_one_is_constant() {
        let mut backoff = Backoff::new(BackoffConfig {
            multiplier: 1,
            ..config()
        });
        assert_eq!(backoff.next_delay(), backoff.next_delay());
    }
}
