//! Control-plane client for the Lairwatch event relay.
//!
//! Speaks the Kubernetes-style REST protocol over HTTP via `reqwest`:
//!
//! - **List-and-watch** (`GET <collection>?watch=true`) returns a
//!   newline-delimited stream of `{"type": ..., "object": ...}` frames,
//!   exposed as a [`WatchSource`](lairwatch_relay::WatchSource).
//! - **Create** (`POST <collection>`) submits a new resource and returns
//!   the object the API server stored.
//!
//! Authentication is a bearer token, either given directly or read from
//! the in-cluster service-account mount.

pub mod client;
pub mod config;
pub mod error;
pub mod stream;

pub use client::{KubeClient, collection_path};
pub use config::KubeConfig;
pub use error::KubeError;
