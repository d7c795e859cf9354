//! Change request API

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use shared::models::{
    ChangeRequest, ChangeRequestApprove, ChangeRequestReject, ChangeRequestSubmit, RequestedChanges,
};

use super::ApiResult;
use crate::state::AppState;
use crate::workflow::{ApprovalDecision, ChangeRequestOutcome};

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub quote_id: i64,
    pub requested_changes: RequestedChanges,
}

pub fn router() -> Router<AppState> {
    Router::new().nest("/api/change-requests", routes())
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(submit))
        .route("/evaluate", post(evaluate))
        .route("/{id}", get(get_by_id))
        .route("/{id}/approve", post(approve))
        .route("/{id}/reject", post(reject))
}

/// POST /api/change-requests/evaluate - dry run of the approval rules
pub async fn evaluate(
    State(state): State<AppState>,
    Json(payload): Json<EvaluateRequest>,
) -> ApiResult<ApprovalDecision> {
    Ok(Json(
        state
            .workflow
            .evaluate_change_request(payload.quote_id, &payload.requested_changes)
            .await?,
    ))
}

/// POST /api/change-requests
pub async fn submit(
    State(state): State<AppState>,
    Json(payload): Json<ChangeRequestSubmit>,
) -> ApiResult<ChangeRequestOutcome> {
    Ok(Json(state.workflow.submit_change_request(&payload).await?))
}

/// GET /api/change-requests/{id}
pub async fn get_by_id(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<ChangeRequest> {
    Ok(Json(state.workflow.find_change_request(id).await?))
}

/// POST /api/change-requests/{id}/approve
pub async fn approve(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ChangeRequestApprove>,
) -> ApiResult<ChangeRequestOutcome> {
    Ok(Json(state.workflow.approve_change_request(id, &payload).await?))
}

/// POST /api/change-requests/{id}/reject
pub async fn reject(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ChangeRequestReject>,
) -> ApiResult<ChangeRequestOutcome> {
    Ok(Json(state.workflow.reject_change_request(id, &payload).await?))
}
