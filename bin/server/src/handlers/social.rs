//! Like and follow endpoints.
//!
//! `POST` creates and `DELETE` removes; both are idempotent and return the
//! resulting `{active, newCount}`. The `/toggle` routes flip the edge.
//! Post likes live under `/likes/:post`, comment likes under
//! `/likes/comment/:id`.

use crate::auth::CurrentActor;
use crate::error::{ApiResult, IdPath};
use crate::state::AppState;
use axum::{
    extract::State,
    Json,
};
use murmur::{ActorId, ContentId, EdgeState, LikeState};
use serde_json::{json, Value};
use tracing::instrument;

#[instrument(skip(state))]
pub async fn like(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    IdPath(post): IdPath<ContentId>,
) -> ApiResult<Json<EdgeState>> {
    Ok(Json(state.coordinator.like(actor, post)?))
}

#[instrument(skip(state))]
pub async fn unlike(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    IdPath(post): IdPath<ContentId>,
) -> ApiResult<Json<EdgeState>> {
    Ok(Json(state.coordinator.unlike(actor, post)?))
}

#[instrument(skip(state))]
pub async fn toggle_like(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    IdPath(post): IdPath<ContentId>,
) -> ApiResult<Json<EdgeState>> {
    Ok(Json(state.coordinator.toggle_like(actor, post)?))
}

#[instrument(skip(state))]
pub async fn like_state(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    IdPath(post): IdPath<ContentId>,
) -> ApiResult<Json<LikeState>> {
    Ok(Json(state.coordinator.like_state(actor, post)?))
}

#[instrument(skip(state))]
pub async fn like_comment(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    IdPath(comment): IdPath<ContentId>,
) -> ApiResult<Json<EdgeState>> {
    Ok(Json(state.coordinator.like_comment(actor, comment)?))
}

#[instrument(skip(state))]
pub async fn unlike_comment(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    IdPath(comment): IdPath<ContentId>,
) -> ApiResult<Json<EdgeState>> {
    Ok(Json(state.coordinator.unlike_comment(actor, comment)?))
}

#[instrument(skip(state))]
pub async fn toggle_comment_like(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    IdPath(comment): IdPath<ContentId>,
) -> ApiResult<Json<EdgeState>> {
    Ok(Json(state.coordinator.toggle_comment_like(actor, comment)?))
}

#[instrument(skip(state))]
pub async fn comment_like_state(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    IdPath(comment): IdPath<ContentId>,
) -> ApiResult<Json<LikeState>> {
    Ok(Json(state.coordinator.comment_like_state(actor, comment)?))
}

#[instrument(skip(state))]
pub async fn follow(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    IdPath(target): IdPath<ActorId>,
) -> ApiResult<Json<EdgeState>> {
    Ok(Json(state.coordinator.follow(actor, target)?))
}

#[instrument(skip(state))]
pub async fn unfollow(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    IdPath(target): IdPath<ActorId>,
) -> ApiResult<Json<EdgeState>> {
    Ok(Json(state.coordinator.unfollow(actor, target)?))
}

#[instrument(skip(state))]
pub async fn toggle_follow(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    IdPath(target): IdPath<ActorId>,
) -> ApiResult<Json<EdgeState>> {
    Ok(Json(state.coordinator.toggle_follow(actor, target)?))
}

#[instrument(skip(state))]
pub async fn is_following(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    IdPath(target): IdPath<ActorId>,
) -> ApiResult<Json<bool>> {
    Ok(Json(state.coordinator.is_following(actor, target)?))
}

#[instrument(skip(state))]
pub async fn follower_count(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    IdPath(target): IdPath<ActorId>,
) -> ApiResult<Json<Value>> {
    let count = state.coordinator.follower_count(actor, target)?;
    Ok(Json(json!({ "count": count })))
}

#[instrument(skip(state))]
pub async fn following_count(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    IdPath(target): IdPath<ActorId>,
) -> ApiResult<Json<Value>> {
    let count = state.coordinator.following_count(actor, target)?;
    Ok(Json(json!({ "count": count })))
}
