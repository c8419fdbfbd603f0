//! Process-wide shutdown signal.
//!
//! Relays, the limiter sweeper and the HTTP server all hold a [`Shutdown`]
//! handle and stop when the single [`ShutdownTrigger`] fires.

use tokio::sync::watch;

/// Create a connected trigger/handle pair.
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

/// Owner side of the shutdown signal.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Signal every [`Shutdown`] handle. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Cloneable handle that resolves once shutdown is requested.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Wait until shutdown is requested.
    ///
    /// If the trigger is dropped without firing, this never resolves.
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn wait_resolves_after_trigger() {
        let (trigger, mut shutdown) = channel();
        let mut other = shutdown.clone();
        trigger.trigger();
        shutdown.wait().await;
        other.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_trigger_does_not_shut_down() {
        let (trigger, mut shutdown) = channel();
        drop(trigger);
        let waited = tokio::time::timeout(Duration::from_secs(5), shutdown.wait()).await;
        assert!(waited.is_err());
    }
}
