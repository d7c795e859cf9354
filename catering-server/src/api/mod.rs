//! HTTP API
//!
//! Handlers are thin: extract, call the [`WorkflowService`](crate::workflow::WorkflowService)
//! operation, return JSON. Errors render through `WorkflowError -> AppError`.

pub mod change_requests;
pub mod health;
pub mod invoices;
pub mod portal;
pub mod quotes;
pub mod stripe_webhook;

use axum::Router;
use axum::routing::{get, post};
use http::{HeaderName, HeaderValue};
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::WorkflowError;
use crate::state::AppState;

/// Handler result: JSON body or a rendered workflow error
pub type ApiResult<T> = Result<axum::Json<T>, WorkflowError>;

#[derive(Clone)]
struct XRequestId;

impl MakeRequestId for XRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// All routes, no middleware
pub fn build_router() -> Router<AppState> {
    // Stripe webhook (signature-verified, raw body)
    let webhook = Router::new().route("/stripe/webhook", post(stripe_webhook::handle_webhook));

    Router::new()
        .route("/health", get(health::health_check))
        .merge(quotes::router())
        .merge(invoices::router())
        .merge(change_requests::router())
        .merge(portal::router())
        .merge(webhook)
}

/// Router with middleware and state
pub fn create_router(state: AppState) -> Router {
    let request_id = HeaderName::from_static("x-request-id");
    build_router()
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, XRequestId))
        .with_state(state)
}
