//! Control-plane resources as seen by the relay.
//!
//! The relay forwards resource snapshots without understanding the game's
//! data model. [`ResourceSnapshot`] keeps the object as an opaque JSON value
//! and only exposes the handful of fields routing needs: the object's own
//! `metadata.namespace`/`metadata.name` and string fields of its `spec`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::WatchAction;

/// A single change notification read from a list-and-watch subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchNotification {
    /// Change type.
    #[serde(rename = "type")]
    pub action: WatchAction,
    /// The changed object (or a status object for [`WatchAction::Error`]).
    pub object: Value,
}

impl WatchNotification {
    /// Build a notification from an action and a raw object.
    pub const fn new(action: WatchAction, object: Value) -> Self {
        Self { action, object }
    }
}

/// Failure to interpret a notification's object as a resource.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The object is not a JSON object.
    #[error("resource is not a JSON object")]
    NotAnObject,
    /// The object has no `metadata` object.
    #[error("resource has no metadata")]
    MissingMetadata,
}

/// Opaque snapshot of a control-plane resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSnapshot {
    object: Value,
}

impl ResourceSnapshot {
    /// Decode a resource from a raw watch object.
    ///
    /// Only the envelope is checked: the value must be an object carrying a
    /// `metadata` object. Everything else is forwarded untouched.
    pub fn from_value(object: Value) -> Result<Self, DecodeError> {
        let map = object.as_object().ok_or(DecodeError::NotAnObject)?;
        if !map.get("metadata").is_some_and(Value::is_object) {
            return Err(DecodeError::MissingMetadata);
        }
        Ok(Self { object })
    }

    /// The resource's own namespace, or `""` for cluster-scoped objects.
    pub fn namespace(&self) -> &str {
        self.metadata_str("namespace")
    }

    /// The resource's own name.
    pub fn name(&self) -> &str {
        self.metadata_str("name")
    }

    /// A string field of the resource's `spec`, if present and non-empty.
    pub fn spec_str(&self, field: &str) -> Option<&str> {
        self.object
            .get("spec")
            .and_then(|spec| spec.get(field))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Consume the snapshot and return the raw object.
    pub fn into_value(self) -> Value {
        self.object
    }

    fn metadata_str(&self, field: &str) -> &str {
        self.object
            .get("metadata")
            .and_then(|m| m.get(field))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

/// A named, versioned category of control-plane objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceCollection {
    /// API group; empty for the core group.
    pub group: &'static str,
    /// API version within the group.
    pub version: &'static str,
    /// Plural resource name used in request paths.
    pub resource: &'static str,
    /// Optional label selector restricting the watched objects.
    pub label_selector: Option<&'static str>,
}

impl ResourceCollection {
    /// Dungeon resources: the primary game entity.
    pub const DUNGEONS: Self = Self {
        group: "game.k8s.example",
        version: "v1alpha1",
        resource: "dungeons",
        label_selector: None,
    };

    /// Attack records: actions that target a dungeon.
    pub const ATTACKS: Self = Self {
        group: "game.k8s.example",
        version: "v1alpha1",
        resource: "attacks",
        label_selector: None,
    };

    /// Worker pods carrying the game entity label.
    pub const ENTITY_PODS: Self = Self {
        group: "",
        version: "v1",
        resource: "pods",
        label_selector: Some("game.k8s.example/entity"),
    };

    /// `apiVersion` string for objects of this collection.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.to_owned()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for ResourceCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            f.write_str(self.resource)
        } else {
            write!(f, "{}.{}", self.resource, self.group)
        }
    }
}
