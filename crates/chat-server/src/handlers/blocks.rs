//! Block relation endpoints.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use tracing::{error, info};

use crate::config::AppState;
use crate::handlers::caller;
use crate::models::{BlockRelation, SetBlockedInput};

/// GET /blocks
///
/// Targets currently blocked by the calling user.
pub async fn list_blocked(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Vec<BlockRelation>>, StatusCode> {
    let user = caller(&headers);

    let blocked = state.service.list_blocked(&user).await.map_err(|e| {
        error!("Failed to list blocked users: {}", e);
        e.status_code()
    })?;

    Ok(Json(blocked))
}

/// PUT /blocks/{target}
///
/// Toggle the directed block relation from the calling user to `target`.
pub async fn set_blocked(
    Path(target): Path<String>,
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(input): Json<SetBlockedInput>,
) -> Result<StatusCode, StatusCode> {
    let blocker = caller(&headers);
    info!(
        "PUT /blocks/{} (blocker {}, blocked={})",
        target, blocker, input.blocked
    );

    state
        .service
        .set_blocked(&blocker, &target, input.blocked)
        .await
        .map_err(|e| {
            error!("Failed to update block relation: {}", e);
            e.status_code()
        })?;

    Ok(StatusCode::OK)
}
