//! Customer portal API
//!
//! Unauthenticated; the invoice access token in the path is the credential.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use super::ApiResult;
use crate::state::AppState;
use crate::workflow::{CheckoutOutcome, CustomerApproval, InvoiceDetail};

pub fn router() -> Router<AppState> {
    Router::new().nest("/api/portal/invoices", routes())
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/{token}", get(view))
        .route("/{token}/approve", post(approve))
        .route("/{token}/checkout", post(checkout))
}

/// GET /api/portal/invoices/{token} - records the first view
pub async fn view(State(state): State<AppState>, Path(token): Path<String>) -> ApiResult<InvoiceDetail> {
    state.workflow.record_view(&token).await?;
    Ok(Json(state.workflow.invoice_detail_by_token(&token).await?))
}

/// POST /api/portal/invoices/{token}/approve
pub async fn approve(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<CustomerApproval> {
    Ok(Json(state.workflow.customer_approve(&token).await?))
}

/// POST /api/portal/invoices/{token}/checkout - pay the next amount due
pub async fn checkout(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<CheckoutOutcome> {
    let invoice = state.workflow.invoice_detail_by_token(&token).await?.invoice;
    Ok(Json(state.workflow.create_checkout(invoice.id).await?))
}
