//! Request gate: per-key cooldown in front of mutation handlers.
//!
//! A [`RateGate`] pairs the shared [`RateLimiter`] with a key function over
//! the route's path parameters. [`gated_post`] wraps a handler so that a
//! rejected call is answered with `429` and never reaches the handler.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::handler::Handler;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, post};
use lairwatch_relay::RateLimiter;
use tracing::debug;

use crate::error::GatewayError;

/// Derives the cooldown key from a request's path parameters.
pub type KeyFn = Arc<dyn Fn(&HashMap<String, String>) -> String + Send + Sync>;

/// Cooldown gate shared by every gated route.
#[derive(Clone)]
pub struct RateGate {
    limiter: Arc<RateLimiter>,
    key_fn: KeyFn,
}

impl RateGate {
    /// Gate keyed by an arbitrary function of the path parameters.
    pub fn new(
        limiter: Arc<RateLimiter>,
        key_fn: impl Fn(&HashMap<String, String>) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            limiter,
            key_fn: Arc::new(key_fn),
        }
    }

    /// Gate keyed by the targeted resource, `"{namespace}/{name}"`.
    pub fn per_target(limiter: Arc<RateLimiter>) -> Self {
        Self::new(limiter, target_key)
    }

    /// Cooldown key for a set of path parameters.
    pub fn key(&self, params: &HashMap<String, String>) -> String {
        (self.key_fn)(params)
    }
}

impl fmt::Debug for RateGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateGate")
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

/// Default key: `namespace` and `name` path parameters joined by `/`.
pub fn target_key(params: &HashMap<String, String>) -> String {
    let namespace = params.get("namespace").map_or("", String::as_str);
    let name = params.get("name").map_or("", String::as_str);
    format!("{namespace}/{name}")
}

/// Middleware body: consult the limiter before running the inner handler.
pub async fn enforce(
    State(gate): State<RateGate>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> Response {
    let key = gate.key(&params);
    if !gate.limiter.allow(&key) {
        debug!(key, "request rejected by cooldown");
        return GatewayError::RateLimited.into_response();
    }
    next.run(request).await
}

/// `POST` route for `handler` guarded by `gate`.
pub fn gated_post<H, T, S>(handler: H, gate: RateGate) -> MethodRouter<S>
where
    H: Handler<T, S>,
    T: 'static,
    S: Clone + Send + Sync + 'static,
{
    post(handler).route_layer(middleware::from_fn_with_state(gate, enforce))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn params(namespace: &str, name: &str) -> HashMap<String, String> {
        HashMap::from([
            ("namespace".to_owned(), namespace.to_owned()),
            ("name".to_owned(), name.to_owned()),
        ])
    }

    #[test]
    fn target_key_joins_namespace_and_name() {
        assert_eq!(target_key(&params("default", "dragon-lair")), "default/dragon-lair");
        assert_eq!(target_key(&HashMap::new()), "/");
    }

    #[test]
    fn custom_key_function_is_used() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(300)));
        let gate = RateGate::new(limiter, |p| p.get("namespace").cloned().unwrap_or_default());
        assert_eq!(gate.key(&params("arena", "pit")), "arena");
    }
}
