//! HTTP and `WebSocket` gateway for the Lairwatch event relay.
//!
//! Serves the dashboard-facing surface of the relay:
//!
//! - a `WebSocket` endpoint that registers each client with the
//!   [`Hub`](lairwatch_relay::Hub) under its namespace/name filter,
//! - a rate-gated attack endpoint that turns accepted submissions into
//!   `Attack` resources in the control plane,
//! - a liveness probe.
//!
//! The binary in `main.rs` wires these to a [`KubeClient`](lairwatch_kube::KubeClient),
//! the default watch relays and the cooldown sweeper.

pub mod config;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod router;
pub mod server;
pub mod sink;
pub mod state;
pub mod ws;

pub use config::{ConfigError, GatewayConfig};
pub use error::GatewayError;
pub use gate::RateGate;
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use sink::{AttackRecord, AttackSink};
pub use state::AppState;
