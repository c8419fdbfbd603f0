//! Per-key cooldown gate for mutation requests.
//!
//! [`RateLimiter::allow`] grants at most one action per key per cooldown
//! window. The check and the update happen under one lock, so two
//! concurrent calls for the same key can never both be granted inside the
//! same window.
//!
//! Keys are created lazily. A periodic [`RateLimiter::sweep`] evicts keys
//! that have been idle for several windows so long-running processes do not
//! accumulate one entry per target forever.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::config::RateLimitConfig;
use crate::shutdown::Shutdown;

/// Cooldown bookkeeping keyed by logical target.
#[derive(Debug)]
pub struct RateLimiter {
    last: Mutex<HashMap<String, Instant>>,
    interval: Duration,
    retention: Duration,
}

impl RateLimiter {
    /// Create a limiter with the given cooldown and the default retention
    /// of ten windows.
    pub fn new(interval: Duration) -> Self {
        Self::with_config(&RateLimitConfig {
            cooldown: interval,
            ..RateLimitConfig::default()
        })
    }

    /// Create a limiter from a full rate limit config.
    pub fn with_config(config: &RateLimitConfig) -> Self {
        Self {
            last: Mutex::new(HashMap::new()),
            interval: config.cooldown,
            retention: config.cooldown.saturating_mul(config.retention_factor),
        }
    }

    /// Grant or deny an action on `key` at the current instant.
    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    /// Grant or deny an action on `key` at `now`.
    ///
    /// Returns `true` and records `now` when the key has no recorded time or
    /// at least one full interval has elapsed since it. Otherwise returns
    /// `false` and leaves the recorded time unchanged.
    pub fn allow_at(&self, key: &str, now: Instant) -> bool {
        let mut last = self.lock();
        if let Some(&at) = last.get(key) {
            if now.saturating_duration_since(at) < self.interval {
                return false;
            }
        }
        last.insert(key.to_owned(), now);
        true
    }

    /// Evict keys whose last grant is older than the retention window.
    ///
    /// Returns the number of evicted keys. An evicted key behaves exactly
    /// like a key that was never seen, which is safe because its cooldown
    /// expired long ago.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut last = self.lock();
        let before = last.len();
        let retention = self.retention.max(self.interval);
        last.retain(|_, at| now.saturating_duration_since(*at) <= retention);
        before.saturating_sub(last.len())
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        // The map holds no invariants a panicking holder could break.
        self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Run [`RateLimiter::sweep`] every `period` until shutdown.
pub fn spawn_sweeper(
    limiter: Arc<RateLimiter>,
    period: Duration,
    mut shutdown: Shutdown,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = shutdown.wait() => break,
                _ = ticker.tick() => {
                    let evicted = limiter.sweep(Instant::now());
                    if evicted > 0 {
                        debug!(evicted, remaining = limiter.len(), "rate limiter sweep");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOLDOWN: Duration = Duration::from_millis(300);

    #[test]
    fn first_call_is_allowed() {
        let limiter = RateLimiter::new(COOLDOWN);
        assert!(limiter.allow_at("default/dragon-lair", Instant::now()));
    }

    #[test]
    fn second_call_inside_window_is_rejected() {
        let limiter = RateLimiter::new(COOLDOWN);
        let t0 = Instant::now();
        assert!(limiter.allow_at("default/dragon-lair", t0));
        assert!(!limiter.allow_at("default/dragon-lair", t0 + Duration::from_millis(50)));
        // The rejected call must not have refreshed the window.
        assert!(limiter.allow_at("default/dragon-lair", t0 + Duration::from_millis(400)));
    }

    #[test]
    fn window_boundary_is_allowed() {
        let limiter = RateLimiter::new(COOLDOWN);
        let t0 = Instant::now();
        assert!(limiter.allow_at("k", t0));
        assert!(!limiter.allow_at("k", t0 + COOLDOWN - Duration::from_millis(1)));
        assert!(limiter.allow_at("k", t0 + COOLDOWN));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(COOLDOWN);
        let t0 = Instant::now();
        assert!(limiter.allow_at("default/dragon-lair", t0));
        assert!(limiter.allow_at("default/other-dungeon", t0));
        assert!(limiter.allow_at("arena/dragon-lair", t0));
        assert_eq!(limiter.len(), 3);
    }

    #[test]
    fn sweep_evicts_only_idle_keys() {
        let limiter = RateLimiter::with_config(&RateLimitConfig {
            cooldown: COOLDOWN,
            retention_factor: 2,
            sweep_period: Duration::from_secs(1),
        });
        let t0 = Instant::now();
        limiter.allow_at("old", t0);
        limiter.allow_at("fresh", t0 + Duration::from_millis(500));

        let evicted = limiter.sweep(t0 + Duration::from_millis(700));
        assert_eq!(evicted, 1);
        assert_eq!(limiter.len(), 1);
        assert!(!limiter.allow_at("fresh", t0 + Duration::from_millis(700)));
        assert!(limiter.allow_at("old", t0 + Duration::from_millis(700)));
    }

    #[test]
    fn concurrent_callers_get_one_grant_per_window() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(60)));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    (0..100).filter(|_| limiter.allow("default/dragon-lair")).count()
                })
            })
            .collect();
        let granted: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap_or(0))
            .sum();
        assert_eq!(granted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_until_shutdown() {
        let limiter = Arc::new(RateLimiter::with_config(&RateLimitConfig {
            cooldown: Duration::from_millis(10),
            retention_factor: 1,
            sweep_period: Duration::from_secs(1),
        }));
        limiter.allow("stale");
        let (trigger, shutdown) = crate::shutdown::channel();
        let handle = spawn_sweeper(Arc::clone(&limiter), Duration::from_secs(1), shutdown);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(limiter.is_empty());

        trigger.trigger();
        assert!(handle.await.is_ok());
    }
}
