//! Axum router construction for the gateway.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::gate::gated_post;
use crate::handlers;
use crate::sink::AttackSink;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /healthz` -- liveness probe
/// - `GET /api/v1/events` -- `WebSocket` event stream
/// - `POST /api/v1/dungeons/{namespace}/{name}/attacks` -- attack submission,
///   behind the state's [`RateGate`](crate::gate::RateGate)
///
/// CORS allows any origin so the dashboard can be served separately.
pub fn build_router<A: AttackSink>(state: Arc<AppState<A>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/api/v1/events", get(ws::events::<A>))
        .route(
            "/api/v1/dungeons/{namespace}/{name}/attacks",
            gated_post(handlers::create_attack::<A>, state.gate.clone()),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
