//! Shared type definitions for the Lairwatch event relay.
//!
//! Every crate in the workspace speaks in terms of the types defined here:
//! the normalized event pushed to dashboard subscribers, the raw watch
//! notifications read from the control plane, and the descriptors of the
//! resource collections being watched. Wire types flow downstream to
//! `TypeScript` via `ts-rs` for the dashboard.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for subscriber identity
//! - [`event`] -- Normalized events, event kinds, watch actions, routing keys
//! - [`resource`] -- Resource snapshots, watch notifications, collections

pub mod event;
pub mod ids;
pub mod resource;

// Re-export all public types at crate root for convenience.
pub use event::{EventKind, NormalizedEvent, RoutingKey, WatchAction};
pub use ids::SubscriberId;
pub use resource::{DecodeError, ResourceCollection, ResourceSnapshot, WatchNotification};

#[cfg(test)]
mod tests {
    #[test]
    fn export_bindings() {
        // ts-rs writes the bindings when export_all is called. The files
        // land in the `bindings/` directory relative to the crate root.
        use ts_rs::TS;

        let _ = crate::event::EventKind::export_all();
        let _ = crate::event::WatchAction::export_all();
        let _ = crate::event::NormalizedEvent::export_all();
    }
}
