//! Collaborator endpoints and session lifecycle.
//!
//! Everything under `/internal` is called by the services that own users,
//! posts and comments, and requires the gateway secret. `POST
//! /internal/sessions` is where an external login hands an authenticated
//! actor id to the cookie session.

use crate::auth::{self, require_gateway};
use crate::error::{ApiResult, IdPath};
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use murmur::{
    ActorId, ContentId, ContentKind, ExternalNotification, NotificationView, Role,
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::{info, instrument};

#[derive(Debug, Deserialize)]
pub struct PutActor {
    pub username: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::User
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutContent {
    pub owner_id: ActorId,
    #[serde(default)]
    pub excerpt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindSession {
    pub actor_id: ActorId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub actor_id: ActorId,
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct DeliveryResult {
    pub delivered: bool,
    pub notification: Option<NotificationView>,
}

#[instrument(skip(state, headers, body))]
pub async fn put_actor(
    State(state): State<AppState>,
    headers: HeaderMap,
    IdPath(id): IdPath<ActorId>,
    body: Result<Json<PutActor>, JsonRejection>,
) -> ApiResult<Json<SessionInfo>> {
    require_gateway(&state, &headers)?;
    let Json(input) = body?;
    let record = state
        .coordinator
        .register_actor(id, &input.username, input.role)?;
    Ok(Json(SessionInfo {
        actor_id: record.id,
        username: record.username,
        role: record.role,
    }))
}

#[instrument(skip(state, headers, body))]
pub async fn put_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    IdPath(id): IdPath<ContentId>,
    body: Result<Json<PutContent>, JsonRejection>,
) -> ApiResult<StatusCode> {
    put_content(&state, &headers, ContentKind::Post, id, body)
}

#[instrument(skip(state, headers, body))]
pub async fn put_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    IdPath(id): IdPath<ContentId>,
    body: Result<Json<PutContent>, JsonRejection>,
) -> ApiResult<StatusCode> {
    put_content(&state, &headers, ContentKind::Comment, id, body)
}

fn put_content(
    state: &AppState,
    headers: &HeaderMap,
    kind: ContentKind,
    id: ContentId,
    body: Result<Json<PutContent>, JsonRejection>,
) -> ApiResult<StatusCode> {
    require_gateway(state, headers)?;
    let Json(input) = body?;
    state
        .coordinator
        .register_content(kind, id, input.owner_id, &input.excerpt)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, headers))]
pub async fn delete_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    IdPath(id): IdPath<ContentId>,
) -> ApiResult<StatusCode> {
    require_gateway(&state, &headers)?;
    state.coordinator.content_removed(ContentKind::Post, id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, headers))]
pub async fn delete_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    IdPath(id): IdPath<ContentId>,
) -> ApiResult<StatusCode> {
    require_gateway(&state, &headers)?;
    state.coordinator.content_removed(ContentKind::Comment, id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, headers, session, body))]
pub async fn bind_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    session: Session,
    body: Result<Json<BindSession>, JsonRejection>,
) -> ApiResult<Json<SessionInfo>> {
    require_gateway(&state, &headers)?;
    let Json(input) = body?;
    let record = state.coordinator.begin_session(input.actor_id)?;
    auth::bind_session(&session, record.id).await?;
    info!(actor = record.id, "Session bound");
    Ok(Json(SessionInfo {
        actor_id: record.id,
        username: record.username,
        role: record.role,
    }))
}

#[instrument(skip(state, headers, body))]
pub async fn notify(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ExternalNotification>, JsonRejection>,
) -> ApiResult<Json<DeliveryResult>> {
    require_gateway(&state, &headers)?;
    let Json(request) = body?;
    let notification = state.coordinator.external_notify(request)?;
    Ok(Json(DeliveryResult {
        delivered: notification.is_some(),
        notification,
    }))
}

/// Logs out: the session and its cookie are discarded.
#[instrument(skip(session))]
pub async fn end_session(session: Session) -> ApiResult<StatusCode> {
    auth::end_session(&session).await?;
    Ok(StatusCode::NO_CONTENT)
}
