//! Quote API
//!
//! Intake, admin status changes and on-demand reconciliation.

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use shared::models::{Quote, QuoteCreate, QuoteStatusUpdate};

use super::ApiResult;
use crate::state::AppState;
use crate::workflow::SyncOutcome;

pub fn router() -> Router<AppState> {
    Router::new().nest("/api/quotes", routes())
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create))
        .route("/{id}", get(get_by_id))
        .route("/{id}/status", put(update_status))
        .route("/{id}/reconcile", post(reconcile))
}

/// POST /api/quotes
pub async fn create(State(state): State<AppState>, Json(payload): Json<QuoteCreate>) -> ApiResult<Quote> {
    Ok(Json(state.workflow.create_quote(&payload).await?))
}

/// GET /api/quotes/{id}
pub async fn get_by_id(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Quote> {
    Ok(Json(state.workflow.find_quote(id).await?))
}

/// PUT /api/quotes/{id}/status
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<QuoteStatusUpdate>,
) -> ApiResult<Quote> {
    Ok(Json(state.workflow.update_quote_status(id, &payload).await?))
}

/// POST /api/quotes/{id}/reconcile
pub async fn reconcile(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<SyncOutcome> {
    Ok(Json(state.workflow.reconcile(id).await?))
}
