//! Resilient list-and-watch relays.
//!
//! One [`WatchRelay`] runs per watched resource collection. Each is an
//! unsupervised loop with two states:
//!
//! ```text
//! Connecting --open ok--> Streaming --stream ends--> Connecting
//!     ^   |                                 |
//!     +---+ open failed: wait backoff       +-- ended at once, nothing
//!                                               delivered: wait backoff
//! ```
//!
//! While streaming, every notification is reduced by [`normalize`] and
//! handed to the [`Hub`]. Transport errors, malformed objects and derived
//! records whose parent cannot be resolved are skipped; nothing short of
//! shutdown ends the loop. Reconnects always drop the previous stream
//! before opening the next one and never resume from a token, so changes
//! made while disconnected are not replayed.

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt as _;
use futures::stream::BoxStream;
use lairwatch_types::{
    DecodeError, EventKind, NormalizedEvent, ResourceCollection, ResourceSnapshot, RoutingKey,
    WatchAction, WatchNotification,
};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::config::BackoffConfig;
use crate::hub::Hub;
use crate::shutdown::Shutdown;

/// Stream of notifications from one open subscription. An `Err` item is a
/// transport-level fault; the stream ending means the upstream closed.
pub type WatchStream<E> = BoxStream<'static, Result<WatchNotification, E>>;

/// Capability to open a fresh list-and-watch subscription on a collection,
/// across all namespaces.
pub trait WatchSource: Send + Sync + 'static {
    /// Error raised when a subscription cannot be opened or breaks.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a new subscription starting from the current state.
    fn watch(
        &self,
        collection: ResourceCollection,
    ) -> impl Future<Output = Result<WatchStream<Self::Error>, Self::Error>> + Send;
}

/// Where an event's routing identity comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMode {
    /// The resource's own `metadata.namespace` / `metadata.name`.
    Own,
    /// The parent entity named in the resource's `spec`.
    Parent {
        /// `spec` field holding the parent namespace.
        namespace_field: &'static str,
        /// `spec` field holding the parent name.
        name_field: &'static str,
    },
}

/// Whether the resource snapshot travels with the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadMode {
    /// Attach the full resource object.
    Snapshot,
    /// Send the event without a payload.
    Omit,
}

/// What one relay watches and how it shapes events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySpec {
    /// Collection to watch.
    pub collection: ResourceCollection,
    /// Kind stamped on every event.
    pub kind: EventKind,
    /// Routing resolution.
    pub routing: RoutingMode,
    /// Payload policy.
    pub payload: PayloadMode,
}

impl RelaySpec {
    /// Dungeons route to themselves and carry their snapshot.
    pub const fn dungeons() -> Self {
        Self {
            collection: ResourceCollection::DUNGEONS,
            kind: EventKind::DungeonUpdate,
            routing: RoutingMode::Own,
            payload: PayloadMode::Snapshot,
        }
    }

    /// Attacks route to the dungeon they target.
    pub const fn attacks() -> Self {
        Self {
            collection: ResourceCollection::ATTACKS,
            kind: EventKind::AttackEvent,
            routing: RoutingMode::Parent {
                namespace_field: "dungeonNamespace",
                name_field: "dungeonName",
            },
            payload: PayloadMode::Snapshot,
        }
    }

    /// Entity pods produce informational events without a payload.
    pub const fn entity_pods() -> Self {
        Self {
            collection: ResourceCollection::ENTITY_PODS,
            kind: EventKind::PodUpdate,
            routing: RoutingMode::Own,
            payload: PayloadMode::Omit,
        }
    }
}

/// Reason a notification produced no event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Skip {
    /// The notification reports a watch-level status, not a resource.
    #[error("error notification")]
    ErrorNotification,
    /// The object does not look like a resource.
    #[error("malformed resource: {0}")]
    Malformed(#[from] DecodeError),
    /// A derived record does not name its parent.
    #[error("cannot resolve parent of {namespace}/{name}")]
    Unroutable {
        /// Namespace of the derived record itself.
        namespace: String,
        /// Name of the derived record itself.
        name: String,
    },
}

/// Reduce one notification to a normalized event.
///
/// Derived records (`RoutingMode::Parent`) missing either parent field are
/// rejected with [`Skip::Unroutable`] rather than broadcast with an empty
/// routing key, which would reach every wildcard subscriber.
pub fn normalize(spec: &RelaySpec, notification: WatchNotification) -> Result<NormalizedEvent, Skip> {
    if notification.action == WatchAction::Error {
        return Err(Skip::ErrorNotification);
    }
    let resource = ResourceSnapshot::from_value(notification.object)?;

    let routing = match spec.routing {
        RoutingMode::Own => RoutingKey::new(resource.namespace(), resource.name()),
        RoutingMode::Parent {
            namespace_field,
            name_field,
        } => match (resource.spec_str(namespace_field), resource.spec_str(name_field)) {
            (Some(namespace), Some(name)) => RoutingKey::new(namespace, name),
            _ => {
                return Err(Skip::Unroutable {
                    namespace: resource.namespace().to_owned(),
                    name: resource.name().to_owned(),
                });
            }
        },
    };

    let payload = match spec.payload {
        PayloadMode::Snapshot => Some(resource.into_value()),
        PayloadMode::Omit => None,
    };

    Ok(NormalizedEvent {
        kind: spec.kind,
        action: notification.action,
        routing,
        payload,
    })
}

/// One persistent subscription loop feeding the hub.
pub struct WatchRelay<S> {
    source: Arc<S>,
    hub: Arc<Hub>,
    spec: RelaySpec,
    backoff: Backoff,
}

impl<S: WatchSource> WatchRelay<S> {
    /// Assemble a relay. Nothing runs until [`WatchRelay::run`].
    pub const fn new(source: Arc<S>, hub: Arc<Hub>, spec: RelaySpec, backoff: BackoffConfig) -> Self {
        Self {
            source,
            hub,
            spec,
            backoff: Backoff::new(backoff),
        }
    }

    /// Run until `shutdown` fires.
    ///
    /// Open failures wait for the next backoff delay. A subscription that
    /// ends is healthy if it delivered at least one resource notification
    /// or stayed open for at least the initial backoff delay; the backoff
    /// then resets and the relay reconnects at once. Any other ending
    /// (transport errors or error notifications only, closed right away)
    /// waits for the next delay, so an upstream that accepts and then
    /// drops every subscription cannot make the loop spin.
    pub async fn run(mut self, mut shutdown: Shutdown) {
        let collection = self.spec.collection;
        info!(%collection, kind = %self.spec.kind, "watch relay started");

        loop {
            let opened = tokio::select! {
                () = shutdown.wait() => break,
                opened = self.source.watch(collection) => opened,
            };

            let stream = match opened {
                Ok(stream) => stream,
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    warn!(
                        %collection,
                        error = %e,
                        attempt = self.backoff.attempt(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "watch open failed, retrying"
                    );
                    if wait_or_shutdown(delay, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };
            debug!(%collection, "watch subscription opened");
            let opened_at = Instant::now();

            let delivered = tokio::select! {
                () = shutdown.wait() => break,
                delivered = self.stream_into_hub(stream) => delivered,
            };

            if delivered > 0 || opened_at.elapsed() >= self.backoff.initial() {
                self.backoff.reset();
                info!(%collection, delivered, "watch stream closed, reconnecting");
            } else {
                let delay = self.backoff.next_delay();
                warn!(
                    %collection,
                    attempt = self.backoff.attempt(),
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "watch closed without delivering, backing off"
                );
                if wait_or_shutdown(delay, &mut shutdown).await {
                    break;
                }
            }
        }

        info!(%collection, "watch relay stopped");
    }

    /// Consume one subscription until it closes; returns how many resource
    /// notifications it delivered. Transport errors and error notifications
    /// are not counted. The stream is dropped on return.
    async fn stream_into_hub(&mut self, mut stream: WatchStream<S::Error>) -> u64 {
        let collection = self.spec.collection;
        let mut delivered: u64 = 0;

        while let Some(item) = stream.next().await {
            let notification = match item {
                Ok(notification) => notification,
                Err(e) => {
                    debug!(%collection, error = %e, "skipping watch transport error");
                    continue;
                }
            };
            if notification.action != WatchAction::Error {
                delivered = delivered.saturating_add(1);
            }

            match normalize(&self.spec, notification) {
                Ok(event) => {
                    let report = self.hub.broadcast(&event).await;
                    debug!(
                        %collection,
                        action = %event.action,
                        routing = %event.routing,
                        delivered = report.delivered,
                        dropped = report.dropped,
                        "event relayed"
                    );
                }
                Err(skip @ Skip::Unroutable { .. }) => {
                    warn!(%collection, reason = %skip, "dropping unroutable event");
                }
                Err(skip) => {
                    debug!(%collection, reason = %skip, "skipping notification");
                }
            }
        }

        delivered
    }
}

impl<S> std::fmt::Debug for WatchRelay<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRelay")
            .field("spec", &self.spec)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

/// Sleep for `delay`; returns `true` if shutdown fired first.
async fn wait_or_shutdown(delay: std::time::Duration, shutdown: &mut Shutdown) -> bool {
    tokio::select! {
        () = shutdown.wait() => true,
        () = tokio::time::sleep(delay) => false,
    }
}

/// Start the dungeon, attack and entity-pod relays on background tasks.
pub fn spawn_default_relays<S: WatchSource>(
    source: &Arc<S>,
    hub: &Arc<Hub>,
    backoff: BackoffConfig,
    shutdown: &Shutdown,
) -> Vec<JoinHandle<()>> {
    [RelaySpec::dungeons(), RelaySpec::attacks(), RelaySpec::entity_pods()]
        .into_iter()
        .map(|spec| {
            let relay = WatchRelay::new(Arc::clone(source), Arc::clone(hub), spec, backoff);
            tokio::spawn(relay.run(shutdown.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn attack(own_name: &str, spec: serde_json::Value) -> WatchNotification {
        WatchNotification::new(
            WatchAction::Added,
            json!({
                "apiVersion": "game.k8s.example/v1alpha1",
                "kind": "Attack",
                "metadata": {"name": own_name, "namespace": "default"},
                "spec": spec,
            }),
        )
    }

    #[test]
    fn primary_event_routes_to_itself() {
        let notification = WatchNotification::new(
            WatchAction::Modified,
            json!({"metadata": {"name": "dragon-lair", "namespace": "default"}, "status": {"victory": false}}),
        );
        let event = normalize(&RelaySpec::dungeons(), notification);
        assert!(event.as_ref().is_ok_and(|e| e.routing == RoutingKey::new("default", "dragon-lair")));
        assert!(event.is_ok_and(|e| {
            e.kind == EventKind::DungeonUpdate
                && e.action == WatchAction::Modified
                && e.payload.is_some_and(|p| p["status"]["victory"] == false)
        }));
    }

    #[test]
    fn derived_event_routes_to_parent() {
        let notification = attack(
            "dragon-lair-boss-4821",
            json!({"dungeonName": "dragon-lair", "dungeonNamespace": "default", "target": "boss", "damage": 20}),
        );
        let event = normalize(&RelaySpec::attacks(), notification);
        assert!(event.is_ok_and(|e| {
            e.routing == RoutingKey::new("default", "dragon-lair") && e.kind == EventKind::AttackEvent
        }));
    }

    #[test]
    fn derived_event_without_parent_is_dropped() {
        let notification = attack("orphan", json!({"target": "boss"}));
        assert_eq!(
            normalize(&RelaySpec::attacks(), notification),
            Err(Skip::Unroutable {
                namespace: "default".to_owned(),
                name: "orphan".to_owned()
            })
        );

        let half = attack("half", json!({"dungeonName": "dragon-lair"}));
        assert!(matches!(
            normalize(&RelaySpec::attacks(), half),
            Err(Skip::Unroutable { .. })
        ));
    }

    #[test]
    fn error_and_malformed_notifications_are_skipped() {
        let status = WatchNotification::new(WatchAction::Error, json!({"kind": "Status", "code": 410}));
        assert_eq!(normalize(&RelaySpec::dungeons(), status), Err(Skip::ErrorNotification));

        let garbage = WatchNotification::new(WatchAction::Added, json!(["not", "a", "resource"]));
        assert_eq!(
            normalize(&RelaySpec::dungeons(), garbage),
            Err(Skip::Malformed(DecodeError::NotAnObject))
        );
    }

    #[test]
    fn pod_events_omit_payload() {
        let pod = WatchNotification::new(
            WatchAction::Deleted,
            json!({"metadata": {"name": "dragon-lair-monster-0", "namespace": "default"}}),
        );
        let event = normalize(&RelaySpec::entity_pods(), pod);
        assert!(event.is_ok_and(|e| e.payload.is_none() && e.kind == EventKind::PodUpdate));
    }
}
