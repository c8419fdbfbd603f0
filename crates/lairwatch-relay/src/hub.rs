//! Filtered fan-out of normalized events to live subscribers.
//!
//! The [`Hub`] owns a registry of subscribers, each holding a
//! [`Connection`] and a [`SubscriptionFilter`]. [`Hub::broadcast`] attempts
//! delivery to every matching subscriber under the registry's shared read
//! lock; registration and removal take the exclusive write lock.
//!
//! Writes are non-blocking. A subscriber whose write fails (peer gone, or a
//! queue that filled because the peer stopped reading) is treated as
//! disconnected: it is removed and its connection closed once the read lock
//! is released. One slow or dead subscriber therefore never delays the
//! others.

use std::collections::HashMap;
use std::sync::Arc;

use lairwatch_types::{NormalizedEvent, RoutingKey, SubscriberId};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

/// Why a frame could not be handed to a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The peer side of the connection is gone.
    #[error("subscriber connection closed")]
    Closed,
    /// The subscriber stopped draining its queue.
    #[error("subscriber queue full")]
    Full,
}

/// A bidirectional message channel to one subscriber, seen from the hub.
pub trait Connection: Send + Sync + 'static {
    /// Hand a serialized frame to the connection without waiting.
    fn send(&self, frame: Arc<str>) -> Result<(), SendError>;

    /// Close the connection. Called exactly once, when the subscriber is
    /// removed from the hub.
    fn close(self: Box<Self>);
}

/// Hub-side end of a bounded per-subscriber queue.
///
/// The transport task owns the matching [`Outbox`] and writes whatever it
/// receives to the wire. Closing the connection drops the sender, which
/// ends the outbox stream and lets the transport task shut the socket.
#[derive(Debug)]
pub struct ChannelConnection {
    tx: mpsc::Sender<Arc<str>>,
}

impl ChannelConnection {
    /// Create a connection with room for `capacity` undelivered frames.
    pub fn new(capacity: usize) -> (Self, Outbox) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, Outbox { rx })
    }
}

impl Connection for ChannelConnection {
    fn send(&self, frame: Arc<str>) -> Result<(), SendError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    fn close(self: Box<Self>) {}
}

/// Transport-side end of a [`ChannelConnection`].
#[derive(Debug)]
pub struct Outbox {
    rx: mpsc::Receiver<Arc<str>>,
}

impl Outbox {
    /// Next frame to write, or `None` once the hub has closed the connection.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.rx.recv().await
    }
}

/// Namespace/name scoping chosen by a subscriber at registration.
///
/// An empty dimension matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionFilter {
    /// Only events routed to this namespace, if non-empty.
    pub namespace: String,
    /// Only events routed to this name, if non-empty.
    pub name: String,
}

impl SubscriptionFilter {
    /// Build a filter; pass empty strings for wildcards.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// A filter that receives every event.
    pub fn all() -> Self {
        Self::default()
    }

    /// Whether an event routed to `key` should be delivered.
    pub fn matches(&self, key: &RoutingKey) -> bool {
        (self.namespace.is_empty() || self.namespace == key.namespace)
            && (self.name.is_empty() || self.name == key.name)
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers the frame was handed to.
    pub delivered: usize,
    /// Matching subscribers dropped because their write failed.
    pub dropped: usize,
}

struct Subscriber {
    connection: Box<dyn Connection>,
    filter: SubscriptionFilter,
}

/// Registry of live subscribers plus filtered broadcast.
#[derive(Default)]
pub struct Hub {
    subscribers: RwLock<HashMap<SubscriberId, Subscriber>>,
}

impl Hub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Filter values are not validated.
    pub async fn add<C: Connection>(&self, connection: C, filter: SubscriptionFilter) -> SubscriberId {
        let id = SubscriberId::new();
        let subscriber = Subscriber {
            connection: Box::new(connection),
            filter,
        };
        self.subscribers.write().await.insert(id, subscriber);
        debug!(subscriber = %id, "subscriber registered");
        id
    }

    /// Deregister a subscriber and close its connection.
    ///
    /// Returns `false` if the subscriber was already gone; removing twice is
    /// not an error.
    pub async fn remove(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.write().await.remove(&id);
        match removed {
            Some(subscriber) => {
                subscriber.connection.close();
                debug!(subscriber = %id, "subscriber removed");
                true
            }
            None => false,
        }
    }

    /// Deliver an event to every subscriber whose filter matches its routing.
    ///
    /// Returns once every matching subscriber has been attempted. Delivery
    /// failures are absorbed here and never reach the caller.
    pub async fn broadcast(&self, event: &NormalizedEvent) -> BroadcastReport {
        match event.to_frame() {
            Ok(frame) => self.broadcast_frame(&event.routing, frame).await,
            Err(e) => {
                warn!(kind = %event.kind, error = %e, "failed to serialize event, dropping");
                BroadcastReport::default()
            }
        }
    }

    /// Deliver an already-serialized frame routed to `routing`.
    pub async fn broadcast_frame(&self, routing: &RoutingKey, frame: Arc<str>) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();
        {
            let subscribers = self.subscribers.read().await;
            for (id, subscriber) in subscribers.iter() {
                if !subscriber.filter.matches(routing) {
                    continue;
                }
                match subscriber.connection.send(Arc::clone(&frame)) {
                    Ok(()) => report.delivered = report.delivered.saturating_add(1),
                    Err(e) => {
                        debug!(subscriber = %id, error = %e, "subscriber write failed");
                        failed.push(*id);
                    }
                }
            }
        }
        for id in failed {
            if self.remove(id).await {
                report.dropped = report.dropped.saturating_add(1);
            }
        }
        report
    }

    /// Number of registered subscribers.
    pub async fn len(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Whether no subscribers are registered.
    pub async fn is_empty(&self) -> bool {
        self.subscribers.read().await.is_empty()
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use lairwatch_types::{EventKind, WatchAction};
    use rand::seq::IndexedRandom;

    use super::*;

    fn event(namespace: &str, name: &str) -> NormalizedEvent {
        NormalizedEvent {
            kind: EventKind::DungeonUpdate,
            action: WatchAction::Modified,
            routing: RoutingKey::new(namespace, name),
            payload: None,
        }
    }

    fn drain(outbox: &mut Outbox) -> Vec<Arc<str>> {
        let mut frames = Vec::new();
        while let Ok(frame) = outbox.rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn filter_rules() {
        let key = RoutingKey::new("default", "dragon-lair");
        assert!(SubscriptionFilter::all().matches(&key));
        assert!(SubscriptionFilter::new("default", "").matches(&key));
        assert!(SubscriptionFilter::new("", "dragon-lair").matches(&key));
        assert!(SubscriptionFilter::new("default", "dragon-lair").matches(&key));
        assert!(!SubscriptionFilter::new("arena", "").matches(&key));
        assert!(!SubscriptionFilter::new("default", "other").matches(&key));
        // A scoped subscriber never sees events without routing identity.
        assert!(!SubscriptionFilter::new("default", "").matches(&RoutingKey::default()));
    }

    #[tokio::test]
    async fn delivers_only_to_matching_subscribers() {
        let hub = Hub::new();
        let (conn_a, mut out_a) = ChannelConnection::new(8);
        let (conn_b, mut out_b) = ChannelConnection::new(8);
        hub.add(conn_a, SubscriptionFilter::new("default", "")).await;
        hub.add(conn_b, SubscriptionFilter::all()).await;

        let report = hub.broadcast(&event("default", "dragon-lair")).await;
        assert_eq!(report, BroadcastReport { delivered: 2, dropped: 0 });

        let report = hub.broadcast(&event("arena", "pit")).await;
        assert_eq!(report.delivered, 1);

        assert_eq!(drain(&mut out_a).len(), 1);
        assert_eq!(drain(&mut out_b).len(), 2);
    }

    #[tokio::test]
    async fn remove_is_idempotent_and_closes_connection() {
        let hub = Hub::new();
        let (conn, mut outbox) = ChannelConnection::new(8);
        let id = hub.add(conn, SubscriptionFilter::all()).await;

        assert!(hub.remove(id).await);
        assert!(!hub.remove(id).await);
        assert!(hub.is_empty().await);
        assert!(outbox.recv().await.is_none());
    }

    #[tokio::test]
    async fn failed_write_removes_subscriber() {
        let hub = Hub::new();
        let (gone, outbox) = ChannelConnection::new(8);
        drop(outbox);
        let (live, mut live_outbox) = ChannelConnection::new(8);
        hub.add(gone, SubscriptionFilter::all()).await;
        hub.add(live, SubscriptionFilter::all()).await;

        let report = hub.broadcast(&event("default", "dragon-lair")).await;
        assert_eq!(report, BroadcastReport { delivered: 1, dropped: 1 });
        assert_eq!(hub.len().await, 1);
        assert_eq!(drain(&mut live_outbox).len(), 1);
    }

    #[tokio::test]
    async fn slow_subscriber_is_dropped_without_blocking_others() {
        let hub = Hub::new();
        let (slow, _slow_outbox) = ChannelConnection::new(1);
        let (fast, mut fast_outbox) = ChannelConnection::new(16);
        hub.add(slow, SubscriptionFilter::all()).await;
        hub.add(fast, SubscriptionFilter::all()).await;

        hub.broadcast(&event("default", "a")).await;
        let report = hub.broadcast(&event("default", "b")).await;
        assert_eq!(report, BroadcastReport { delivered: 1, dropped: 1 });

        hub.broadcast(&event("default", "c")).await;
        assert_eq!(drain(&mut fast_outbox).len(), 3);
        assert_eq!(hub.len().await, 1);
    }

    #[tokio::test]
    async fn routing_matches_filters_for_random_combinations() {
        let namespaces = ["", "default", "arena"];
        let names = ["", "dragon-lair", "other-dungeon"];
        let mut rng = rand::rng();

        for _ in 0..200 {
            let hub = Hub::new();
            let filter = SubscriptionFilter::new(
                *namespaces.choose(&mut rng).unwrap_or(&""),
                *names.choose(&mut rng).unwrap_or(&""),
            );
            let (conn, mut outbox) = ChannelConnection::new(4);
            hub.add(conn, filter.clone()).await;

            let ns = *namespaces.choose(&mut rng).unwrap_or(&"");
            let name = *names.choose(&mut rng).unwrap_or(&"");
            let ev = event(ns, name);
            hub.broadcast(&ev).await;

            let expected = (filter.namespace.is_empty() || filter.namespace == ns)
                && (filter.name.is_empty() || filter.name == name);
            let received = drain(&mut outbox).len() == 1;
            assert_eq!(received, expected, "filter {filter:?} event {ns}/{name}");
        }
    }
}
