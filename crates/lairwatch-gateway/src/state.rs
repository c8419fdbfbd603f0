//! Shared application state for the gateway.
//!
//! [`AppState`] holds handles to the long-lived components built at
//! startup: the subscriber [`Hub`], the attack sink, the cooldown gate and
//! the shutdown signal that closes open `WebSocket` sessions.

use std::sync::Arc;

use lairwatch_relay::{Hub, Shutdown};

use crate::gate::RateGate;
use crate::sink::AttackSink;

/// State shared by every route.
#[derive(Debug)]
pub struct AppState<A> {
    /// Subscriber registry fed by the watch relays.
    pub hub: Arc<Hub>,
    /// Where accepted attacks are sent.
    pub attacks: A,
    /// Cooldown gate for mutation routes.
    pub gate: RateGate,
    /// Frames buffered per `WebSocket` subscriber.
    pub queue_capacity: usize,
    /// Fires when the process is stopping.
    pub shutdown: Shutdown,
}

impl<A: AttackSink> AppState<A> {
    /// Bundle the startup components into shared state.
    pub fn new(
        hub: Arc<Hub>,
        attacks: A,
        gate: RateGate,
        queue_capacity: usize,
        shutdown: Shutdown,
    ) -> Arc<Self> {
        Arc::new(Self {
            hub,
            attacks,
            gate,
            queue_capacity,
            shutdown,
        })
    }
}
