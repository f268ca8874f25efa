//! Actor administration: bans, deletion, the actor list and the dashboard.
//!
//! Bulk commands answer 200 with one outcome per listed actor, even when
//! some of them failed.

use crate::auth::CurrentActor;
use crate::error::{ApiError, ApiResult, IdPath};
use crate::state::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Json,
};
use murmur::constants::DEFAULT_ACTOR_PAGE_SIZE;
use murmur::{
    ActorId, ActorView, BanRecord, BanRequest, BulkBanRequest, BulkOutcome, DashboardStats,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, instrument};

#[derive(Debug, Default, Deserialize)]
pub struct ActorPage {
    #[serde(default)]
    pub page: usize,
    #[serde(default)]
    pub size: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeleteRequest {
    pub user_ids: Vec<ActorId>,
}

#[instrument(skip(state))]
pub async fn list_actors(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    query: Result<Query<ActorPage>, QueryRejection>,
) -> ApiResult<Json<Vec<ActorView>>> {
    let Query(page) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let size = page.size.unwrap_or(DEFAULT_ACTOR_PAGE_SIZE);
    Ok(Json(state.coordinator.list_actors(actor, page.page, size)?))
}

#[instrument(skip(state, body))]
pub async fn bulk_ban(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    body: Result<Json<BulkBanRequest>, JsonRejection>,
) -> ApiResult<Json<Vec<BulkOutcome>>> {
    let Json(request) = body?;
    Ok(Json(state.coordinator.bulk_ban(actor, request)?))
}

#[instrument(skip(state, body))]
pub async fn bulk_delete(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    body: Result<Json<BulkDeleteRequest>, JsonRejection>,
) -> ApiResult<Json<Vec<BulkOutcome>>> {
    let Json(request) = body?;
    Ok(Json(state.coordinator.bulk_delete(actor, &request.user_ids)?))
}

#[instrument(skip(state, body))]
pub async fn ban_actor(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    IdPath(target): IdPath<ActorId>,
    body: Result<Json<BanRequest>, JsonRejection>,
) -> ApiResult<Json<BanRecord>> {
    let Json(request) = body?;
    Ok(Json(state.coordinator.ban_actor(actor, target, request)?))
}

#[instrument(skip(state))]
pub async fn unban_actor(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    IdPath(target): IdPath<ActorId>,
) -> ApiResult<Json<Value>> {
    let lifted = state.coordinator.unban_actor(actor, target)?;
    Ok(Json(json!({ "unbanned": lifted })))
}

#[instrument(skip(state))]
pub async fn delete_actor(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    IdPath(target): IdPath<ActorId>,
) -> ApiResult<Json<Value>> {
    state.coordinator.delete_actor(actor, target)?;
    info!(actor = target, "Actor deleted by administrator");
    Ok(Json(json!({ "deleted": true })))
}

#[instrument(skip(state))]
pub async fn actor_view(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    IdPath(target): IdPath<ActorId>,
) -> ApiResult<Json<ActorView>> {
    Ok(Json(state.coordinator.actor_view(actor, target)?))
}

#[instrument(skip(state))]
pub async fn stats(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> ApiResult<Json<DashboardStats>> {
    Ok(Json(state.coordinator.stats(actor)?))
}
