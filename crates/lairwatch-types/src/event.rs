//! The normalized event delivered to every matching subscriber.
//!
//! Control-plane notifications for different resource collections are
//! reduced to one shape so the dashboard only ever parses a single
//! message type:
//!
//! ```json
//! {"type": "ATTACK_EVENT", "action": "ADDED", "name": "dragon-lair",
//!  "namespace": "default", "payload": {"spec": {"target": "boss"}}}
//! ```
//!
//! `name` and `namespace` are omitted when empty, `payload` when absent.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Category of a normalized event, derived from the relay that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum EventKind {
    /// A dungeon resource changed.
    DungeonUpdate,
    /// An attack record was created, updated or removed.
    AttackEvent,
    /// A game worker pod changed state.
    PodUpdate,
}

impl EventKind {
    /// Wire name of the kind (`DUNGEON_UPDATE`, ...).
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DungeonUpdate => "DUNGEON_UPDATE",
            Self::AttackEvent => "ATTACK_EVENT",
            Self::PodUpdate => "POD_UPDATE",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Change type of a watch notification, as reported by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum WatchAction {
    /// The resource was created (or listed on subscription start).
    Added,
    /// The resource was updated.
    Modified,
    /// The resource was removed.
    Deleted,
    /// The notification carries a transport-level status, not a resource.
    Error,
}

impl WatchAction {
    /// Wire name of the action (`ADDED`, ...).
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "ADDED",
            Self::Modified => "MODIFIED",
            Self::Deleted => "DELETED",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for WatchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `(namespace, name)` identity used to decide who receives an event.
///
/// For primary resources this is the resource's own identity. For derived
/// resources (attacks) it is the parent dungeon the record targets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RoutingKey {
    /// Logical name of the routed entity.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Namespace of the routed entity.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

impl RoutingKey {
    /// Build a routing key from a namespace and a name.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Uniform message pushed to subscribers for every observed resource change.
///
/// Built once per watch notification, serialized once, then dropped after
/// the broadcast. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct NormalizedEvent {
    /// Event category.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Change type taken from the underlying notification.
    pub action: WatchAction,
    /// Routing identity subscribers filter on.
    #[serde(flatten)]
    pub routing: RoutingKey,
    /// Snapshot of the resource when the change was observed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub payload: Option<serde_json::Value>,
}

impl NormalizedEvent {
    /// Serialize the event into a shareable text frame.
    ///
    /// The frame is encoded once and the same allocation is handed to every
    /// subscriber queue.
    pub fn to_frame(&self) -> Result<Arc<str>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_matches_dashboard_contract() {
        let event = NormalizedEvent {
            kind: EventKind::DungeonUpdate,
            action: WatchAction::Modified,
            routing: RoutingKey::new("default", "dragon-lair"),
            payload: Some(serde_json::json!({"status": {"bossState": "alive"}})),
        };
        let json = serde_json::to_value(&event).unwrap_or_default();
        assert_eq!(json["type"], "DUNGEON_UPDATE");
        assert_eq!(json["action"], "MODIFIED");
        assert_eq!(json["namespace"], "default");
        assert_eq!(json["name"], "dragon-lair");
        assert_eq!(json["payload"]["status"]["bossState"], "alive");
    }

    #[test]
    fn empty_fields_are_omitted() {
        let event = NormalizedEvent {
            kind: EventKind::PodUpdate,
            action: WatchAction::Deleted,
            routing: RoutingKey::default(),
            payload: None,
        };
        let frame = event.to_frame().unwrap_or_else(|_| Arc::from(""));
        assert_eq!(&*frame, r#"{"type":"POD_UPDATE","action":"DELETED"}"#);
    }

    #[test]
    fn routing_key_display() {
        assert_eq!(
            RoutingKey::new("default", "dragon-lair").to_string(),
            "default/dragon-lair"
        );
    }
}
