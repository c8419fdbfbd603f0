//! Configuration for the gateway binary.
//!
//! All configuration is loaded from environment variables with defaults
//! suitable for local development against `kubectl proxy`.

use std::str::FromStr;
use std::time::Duration;

use lairwatch_relay::config::{BackoffConfig, RateLimitConfig, RelayConfig};
use lairwatch_relay::error::RelayError;

use crate::server::ServerConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("invalid {name}: {message}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Parse failure description.
        message: String,
    },

    /// Parsed values are out of range for the relay.
    #[error(transparent)]
    Relay(#[from] RelayError),
}

/// Complete gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// HTTP bind settings.
    pub server: ServerConfig,
    /// Hub, watch and rate-limit settings.
    pub relay: RelayConfig,
}

impl GatewayConfig {
    /// Load configuration from process environment variables.
    ///
    /// Optional variables:
    /// - `HOST` -- bind address (default `0.0.0.0`)
    /// - `PORT` -- bind port (default 8080)
    /// - `ATTACK_COOLDOWN_MS` -- per-dungeon attack cooldown (default 300)
    /// - `RATE_LIMIT_SWEEP_SECS` -- idle cooldown eviction period (default 60)
    /// - `SUBSCRIBER_QUEUE_CAPACITY` -- frames buffered per subscriber (default 256)
    /// - `WATCH_BACKOFF_INITIAL_MS` -- first reconnect delay (default 250)
    /// - `WATCH_BACKOFF_MAX_MS` -- reconnect delay ceiling (default 30000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let server_defaults = ServerConfig::default();
        let relay_defaults = RelayConfig::default();
        let rate_defaults = relay_defaults.rate_limit;
        let backoff_defaults = relay_defaults.backoff;

        let server = ServerConfig {
            host: lookup("HOST").unwrap_or(server_defaults.host),
            port: parse_or(&lookup, "PORT", server_defaults.port)?,
        };

        let relay = RelayConfig {
            subscriber_queue_capacity: parse_or(
                &lookup,
                "SUBSCRIBER_QUEUE_CAPACITY",
                relay_defaults.subscriber_queue_capacity,
            )?,
            backoff: BackoffConfig {
                initial: millis_or(&lookup, "WATCH_BACKOFF_INITIAL_MS", backoff_defaults.initial)?,
                max: millis_or(&lookup, "WATCH_BACKOFF_MAX_MS", backoff_defaults.max)?,
                multiplier: backoff_defaults.multiplier,
            },
            rate_limit: RateLimitConfig {
                cooldown: millis_or(&lookup, "ATTACK_COOLDOWN_MS", rate_defaults.cooldown)?,
                retention_factor: rate_defaults.retention_factor,
                sweep_period: Duration::from_secs(parse_or(
                    &lookup,
                    "RATE_LIMIT_SWEEP_SECS",
                    rate_defaults.sweep_period.as_secs(),
                )?),
            },
        };
        relay.validate()?;

        Ok(Self { server, relay })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name).map_or(Ok(default), |raw| {
        raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            message: e.to_string(),
        })
    })
}

fn millis_or(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_or(lookup, name, default_ms).map(Duration::from_millis)
}
