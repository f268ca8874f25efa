//! Inbox pull and read-state endpoints.

use crate::auth::CurrentActor;
use crate::error::{ApiResult, IdPath};
use crate::state::AppState;
use axum::{
    extract::State,
    Json,
};
use murmur::{NotificationId, NotificationView};
use serde_json::{json, Value};
use tracing::instrument;

#[instrument(skip(state))]
pub async fn list(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> ApiResult<Json<Vec<NotificationView>>> {
    Ok(Json(state.coordinator.notifications(actor)?))
}

#[instrument(skip(state))]
pub async fn unread_count(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> ApiResult<Json<Value>> {
    let count = state.coordinator.unread_count(actor)?;
    Ok(Json(json!({ "count": count })))
}

#[instrument(skip(state))]
pub async fn mark_read(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    IdPath(id): IdPath<NotificationId>,
) -> ApiResult<Json<NotificationView>> {
    Ok(Json(state.coordinator.mark_read(actor, id)?))
}

#[instrument(skip(state))]
pub async fn mark_all_read(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> ApiResult<Json<Value>> {
    let updated = state.coordinator.mark_all_read(actor)?;
    Ok(Json(json!({ "updated": updated })))
}

#[instrument(skip(state))]
pub async fn delete_one(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    IdPath(id): IdPath<NotificationId>,
) -> ApiResult<Json<Value>> {
    state.coordinator.delete_notification(actor, id)?;
    Ok(Json(json!({ "deleted": true })))
}

#[instrument(skip(state))]
pub async fn clear(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> ApiResult<Json<Value>> {
    let removed = state.coordinator.clear_notifications(actor)?;
    Ok(Json(json!({ "removed": removed })))
}
