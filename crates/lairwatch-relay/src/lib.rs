//! Event relay core for the Lairwatch game backend.
//!
//! Game state lives in an external control plane. This crate keeps a
//! long-lived watch open on each interesting resource collection, reduces
//! every change notification to a [`NormalizedEvent`], and fans it out to
//! the dashboard subscribers whose filters match. It also provides the
//! per-key cooldown gate used to throttle mutation requests.
//!
//! # Architecture
//!
//! ```text
//! control plane --watch--> WatchRelay (one per collection) --> Hub --> subscribers
//!                                                                 (filtered)
//! mutation request --> RateLimiter::allow(key) --> handler
//! ```
//!
//! The [`Hub`] and the [`RateLimiter`] are constructed once at startup and
//! shared by handle; nothing here is a global.
//!
//! [`NormalizedEvent`]: lairwatch_types::NormalizedEvent
//! [`Hub`]: hub::Hub
//! [`RateLimiter`]: ratelimit::RateLimiter

pub mod backoff;
pub mod config;
pub mod error;
pub mod hub;
pub mod ratelimit;
pub mod shutdown;
pub mod watch;

// Re-export primary types for convenience.
pub use backoff::Backoff;
pub use config::{BackoffConfig, RateLimitConfig, RelayConfig};
pub use error::RelayError;
pub use hub::{BroadcastReport, ChannelConnection, Connection, Hub, Outbox, SendError, SubscriptionFilter};
pub use ratelimit::RateLimiter;
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use watch::{PayloadMode, RelaySpec, RoutingMode, Skip, WatchRelay, WatchSource, WatchStream};
