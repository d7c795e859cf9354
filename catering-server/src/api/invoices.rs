//! Invoice API (admin)

use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use shared::models::{ChangeRequest, Invoice, InvoiceCreate, LineItemInput, PaymentInput, PaymentMilestone};

use super::ApiResult;
use crate::state::AppState;
use crate::workflow::{CheckoutOutcome, InvoiceDetail, InvoiceOutcome, PaymentOutcome, WaterfallOutcome};

pub fn router() -> Router<AppState> {
    Router::new().nest("/api/invoices", routes())
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create))
        .route("/{id}", get(get_by_id))
        .route("/{id}/line-items", post(add_line_item))
        .route("/{id}/line-items/{item_id}", delete(remove_line_item))
        .route("/{id}/send", post(send))
        .route("/{id}/cancel", post(cancel))
        .route("/{id}/milestones", get(list_milestones).post(generate_milestones))
        .route("/{id}/payments", post(record_payment))
        .route("/{id}/waterfall", post(apply_waterfall))
        .route("/{id}/checkout", post(checkout))
        .route("/{id}/change-requests", get(list_change_requests))
}

/// POST /api/invoices
pub async fn create(State(state): State<AppState>, Json(payload): Json<InvoiceCreate>) -> ApiResult<Invoice> {
    Ok(Json(state.workflow.create_invoice(&payload).await?))
}

/// GET /api/invoices/{id}
pub async fn get_by_id(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<InvoiceDetail> {
    Ok(Json(state.workflow.invoice_detail(id).await?))
}

/// POST /api/invoices/{id}/line-items
pub async fn add_line_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<LineItemInput>,
) -> ApiResult<Invoice> {
    Ok(Json(state.workflow.add_line_item(id, &payload).await?))
}

/// DELETE /api/invoices/{id}/line-items/{item_id}
pub async fn remove_line_item(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(i64, i64)>,
) -> ApiResult<Invoice> {
    Ok(Json(state.workflow.remove_line_item(id, item_id).await?))
}

/// POST /api/invoices/{id}/send
pub async fn send(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<InvoiceOutcome> {
    Ok(Json(state.workflow.send_invoice(id).await?))
}

/// POST /api/invoices/{id}/cancel
pub async fn cancel(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Invoice> {
    Ok(Json(state.workflow.cancel_invoice(id).await?))
}

/// GET /api/invoices/{id}/milestones
pub async fn list_milestones(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Vec<PaymentMilestone>> {
    Ok(Json(state.workflow.list_milestones(id).await?))
}

/// POST /api/invoices/{id}/milestones
pub async fn generate_milestones(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Vec<PaymentMilestone>> {
    Ok(Json(state.workflow.generate_milestones(id).await?))
}

/// POST /api/invoices/{id}/payments - offline payment (check, cash, bank transfer)
pub async fn record_payment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<PaymentInput>,
) -> ApiResult<PaymentOutcome> {
    Ok(Json(state.workflow.record_payment(id, &payload).await?))
}

/// POST /api/invoices/{id}/waterfall
pub async fn apply_waterfall(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<WaterfallOutcome> {
    Ok(Json(state.workflow.apply_waterfall(id).await?))
}

/// POST /api/invoices/{id}/checkout
pub async fn checkout(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<CheckoutOutcome> {
    Ok(Json(state.workflow.create_checkout(id).await?))
}

/// GET /api/invoices/{id}/change-requests
pub async fn list_change_requests(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Vec<ChangeRequest>> {
    Ok(Json(state.workflow.list_change_requests(id).await?))
}
