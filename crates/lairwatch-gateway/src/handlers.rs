//! REST handlers for the gateway.
//!
//! | Method | Path                                         | Description            |
//! |--------|----------------------------------------------|------------------------|
//! | POST   | `/api/v1/dungeons/{namespace}/{name}/attacks` | Submit an attack (gated) |
//! | GET    | `/healthz`                                   | Liveness probe         |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::info;

use crate::error::GatewayError;
use crate::sink::{AttackRecord, AttackSink};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Body of an attack submission.
#[derive(Debug, serde::Deserialize)]
pub struct CreateAttackRequest {
    /// What is being attacked or which ability is used.
    pub target: String,
    /// Requested damage; zero and negative values are passed through.
    #[serde(default)]
    pub damage: i64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Submit an attack against a dungeon.
///
/// Only reached when the request gate admitted the call. Responds `202`
/// with the created resource; its effects arrive later on the event stream.
pub async fn create_attack<A: AttackSink>(
    State(state): State<Arc<AppState<A>>>,
    Path((namespace, name)): Path<(String, String)>,
    Json(body): Json<CreateAttackRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    if body.target.trim().is_empty() {
        return Err(GatewayError::InvalidRequest("target required".to_owned()));
    }

    let record = AttackRecord {
        dungeon_namespace: namespace,
        dungeon_name: name,
        target: body.target,
        damage: body.damage,
    };
    let created = state.attacks.submit(&record).await?;

    info!(
        namespace = record.dungeon_namespace,
        dungeon = record.dungeon_name,
        target = record.target,
        damage = record.damage,
        "attack submitted"
    );

    Ok((StatusCode::ACCEPTED, Json(created)))
}

/// Liveness probe.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}
