//! Attack submission to the control plane.
//!
//! Handlers never talk to the API server directly; they go through an
//! [`AttackSink`]. [`KubeClient`] is the production sink and tests plug in
//! a recording one.

use lairwatch_kube::KubeClient;
use lairwatch_types::ResourceCollection;
use serde_json::{Value, json};
use tracing::warn;

use crate::error::GatewayError;

/// Namespace every `Attack` resource is created in, regardless of the
/// dungeon's own namespace. The dungeon is named by `spec.dungeonNamespace`.
pub const ATTACK_NAMESPACE: &str = "default";

/// An accepted attack, ready to be materialized as a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackRecord {
    /// Namespace of the attacked dungeon.
    pub dungeon_namespace: String,
    /// Name of the attacked dungeon.
    pub dungeon_name: String,
    /// Attack target (a monster, the boss, or an ability such as `use-potion`).
    pub target: String,
    /// Requested damage. Interpreted by the reconciler, not here.
    pub damage: i64,
}

impl AttackRecord {
    /// Resource name for this attack at wall-clock time `unix_millis`.
    ///
    /// Only the low five digits of the timestamp are kept, so names stay
    /// short while repeated attacks on the same target remain distinct.
    pub fn resource_name(&self, unix_millis: i64) -> String {
        format!(
            "{}-{}-{}",
            self.dungeon_name,
            self.target,
            unix_millis.rem_euclid(100_000)
        )
    }

    /// Full `Attack` object as posted to the control plane.
    pub fn to_resource(&self, resource_name: &str) -> Value {
        let collection = ResourceCollection::ATTACKS;
        json!({
            "apiVersion": collection.api_version(),
            "kind": "Attack",
            "metadata": { "name": resource_name },
            "spec": {
                "dungeonName": self.dungeon_name,
                "dungeonNamespace": self.dungeon_namespace,
                "target": self.target,
                "damage": self.damage,
            },
        })
    }
}

/// Destination for accepted attacks.
pub trait AttackSink: Send + Sync + 'static {
    /// Persist `attack` and return the stored representation.
    fn submit(
        &self,
        attack: &AttackRecord,
    ) -> impl Future<Output = Result<Value, GatewayError>> + Send;
}

impl AttackSink for KubeClient {
    async fn submit(&self, attack: &AttackRecord) -> Result<Value, GatewayError> {
        let name = attack.resource_name(chrono::Utc::now().timestamp_millis());
        let object = attack.to_resource(&name);
        self.create(ResourceCollection::ATTACKS, ATTACK_NAMESPACE, &object)
            .await
            .map_err(|e| {
                warn!(attack = name, error = %e, "attack creation failed");
                GatewayError::Upstream(e.to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> AttackRecord {
        AttackRecord {
            dungeon_namespace: "default".to_owned(),
            dungeon_name: "dragon-lair".to_owned(),
            target: "goblin-0".to_owned(),
            damage: 12,
        }
    }

    #[test]
    fn resource_name_keeps_low_timestamp_digits() {
        assert_eq!(record().resource_name(1_700_000_123_456), "dragon-lair-goblin-0-23456");
        assert_eq!(record().resource_name(42), "dragon-lair-goblin-0-42");
    }

    #[test]
    fn resource_references_the_dungeon_in_spec() {
        let object = record().to_resource("a1");
        assert_eq!(object["apiVersion"], "game.k8s.example/v1alpha1");
        assert_eq!(object["kind"], "Attack");
        assert_eq!(object["metadata"]["name"], "a1");
        assert_eq!(object["spec"]["dungeonName"], "dragon-lair");
        assert_eq!(object["spec"]["dungeonNamespace"], "default");
        assert_eq!(object["spec"]["target"], "goblin-0");
        assert_eq!(object["spec"]["damage"], 12);
    }
}
