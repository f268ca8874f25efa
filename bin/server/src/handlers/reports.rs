//! Report intake and administration.

use super::optional_json;
use crate::auth::CurrentActor;
use crate::error::{ApiError, ApiResult, IdPath};
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Json,
};
use murmur::{DismissRequest, NewReport, Report, ReportId, ReportStatus, ResolveRequest};
use serde::Deserialize;
use tracing::{info, instrument};

#[derive(Debug, Default, Deserialize)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
}

#[instrument(skip(state, body))]
pub async fn create_report(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    body: Result<Json<NewReport>, JsonRejection>,
) -> ApiResult<Json<Report>> {
    let Json(input) = body?;
    let report = state.coordinator.create_report(actor, input)?;
    info!(report = report.id, "Report filed");
    Ok(Json(report))
}

#[instrument(skip(state))]
pub async fn my_reports(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> ApiResult<Json<Vec<Report>>> {
    Ok(Json(state.coordinator.my_reports(actor)?))
}

#[instrument(skip(state))]
pub async fn list_reports(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    filter: Result<Query<ReportFilter>, QueryRejection>,
) -> ApiResult<Json<Vec<Report>>> {
    let Query(filter) = filter.map_err(|e| ApiError::bad_request(e.body_text()))?;
    Ok(Json(state.coordinator.list_reports(actor, filter.status)?))
}

#[instrument(skip(state))]
pub async fn get_report(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    IdPath(id): IdPath<ReportId>,
) -> ApiResult<Json<Report>> {
    Ok(Json(state.coordinator.get_report(actor, id)?))
}

#[instrument(skip(state, body))]
pub async fn resolve_report(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    IdPath(id): IdPath<ReportId>,
    body: Bytes,
) -> ApiResult<Json<Report>> {
    let request: ResolveRequest = optional_json(&body)?;
    Ok(Json(state.coordinator.resolve_report(actor, id, request)?))
}

#[instrument(skip(state, body))]
pub async fn dismiss_report(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    IdPath(id): IdPath<ReportId>,
    body: Bytes,
) -> ApiResult<Json<Report>> {
    let request: DismissRequest = optional_json(&body)?;
    Ok(Json(state.coordinator.dismiss_report(actor, id, request)?))
}

#[instrument(skip(state))]
pub async fn escalate_report(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    IdPath(id): IdPath<ReportId>,
) -> ApiResult<Json<Report>> {
    Ok(Json(state.coordinator.escalate_report(actor, id)?))
}
