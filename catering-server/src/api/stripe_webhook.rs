//! Stripe webhook handler
//!
//! POST /stripe/webhook, raw body for signature verification.
//!
//! Only Checkout Session events matter here: the session id is the
//! `gateway_ref` of the pending transaction created at checkout.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use shared::models::TransactionStatus;

use crate::db::webhook_events;
use crate::state::AppState;
use crate::stripe;

/// Transaction outcome carried by an event type, if it is one we handle
fn settlement_for(event_type: &str, payment_status: Option<&str>) -> Option<TransactionStatus> {
    match event_type {
        // Delayed payment methods complete the session unpaid and report later
        "checkout.session.completed" if payment_status == Some("paid") => {
            Some(TransactionStatus::Completed)
        }
        "checkout.session.async_payment_succeeded" => Some(TransactionStatus::Completed),
        "checkout.session.expired" | "checkout.session.async_payment_failed" => {
            Some(TransactionStatus::Failed)
        }
        _ => None,
    }
}

pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    // 1. Signature
    let Some(sig_header) = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
    else {
        tracing::warn!("Missing Stripe-Signature header");
        return StatusCode::BAD_REQUEST;
    };

    let now = chrono::Utc::now().timestamp();
    if let Err(e) =
        stripe::verify_webhook_signature(&body, sig_header, &state.stripe_webhook_secret, now)
    {
        tracing::warn!(error = %e, "Webhook signature verification failed");
        return StatusCode::BAD_REQUEST;
    }

    // 2. Parse
    let event: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(%e, "Failed to parse webhook JSON");
            return StatusCode::BAD_REQUEST;
        }
    };
    let event_type = event["type"].as_str().unwrap_or("");
    let Some(event_id) = event["id"].as_str() else {
        tracing::warn!("Webhook event missing id");
        return StatusCode::BAD_REQUEST;
    };
    tracing::info!(event_id, event_type, "Received Stripe webhook");

    let obj = &event["data"]["object"];
    let Some(status) = settlement_for(event_type, obj["payment_status"].as_str()) else {
        tracing::debug!(event_type, "Unhandled webhook event type");
        return StatusCode::OK;
    };
    let Some(session_id) = obj["id"].as_str() else {
        tracing::warn!(event_id, "Checkout event without session id");
        return StatusCode::OK;
    };

    // 3. Idempotency: INSERT first, check rows_affected
    let mut conn = match state.pool.acquire().await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(%e, "DB error recording webhook event");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };
    match webhook_events::mark_processed(&mut conn, event_id, event_type).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::info!(event_id, "Duplicate webhook event, skipping");
            return StatusCode::OK;
        }
        Err(e) => {
            tracing::error!(%e, "DB error recording webhook event");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    }
    drop(conn);

    // 4. Settle the transaction and re-run the waterfall
    match state.workflow.settle_gateway_payment(session_id, status).await {
        Ok(Some(outcome)) => {
            tracing::info!(
                event_id,
                invoice_id = outcome.invoice_id,
                total_paid = outcome.total_paid_cents,
                invoice_status = %outcome.invoice_status,
                "Checkout session settled"
            );
            StatusCode::OK
        }
        Ok(None) => StatusCode::OK,
        Err(e) => {
            tracing::error!(event_id, session_id, error = %e, "Failed to settle checkout session");
            // Let Stripe's retry reach us again
            if let Ok(mut conn) = state.pool.acquire().await
                && let Err(e) = webhook_events::forget(&mut conn, event_id).await
            {
                tracing::error!(event_id, error = %e, "Failed to release webhook event");
            }
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settlement_mapping() {
        assert_eq!(
            settlement_for("checkout.session.completed", Some("paid")),
            Some(TransactionStatus::Completed)
        );
        assert_eq!(settlement_for("checkout.session.completed", Some("unpaid")), None);
        assert_eq!(
            settlement_for("checkout.session.async_payment_succeeded", None),
            Some(TransactionStatus::Completed)
        );
        assert_eq!(
            settlement_for("checkout.session.expired", None),
            Some(TransactionStatus::Failed)
        );
        assert_eq!(
            settlement_for("checkout.session.async_payment_failed", None),
            Some(TransactionStatus::Failed)
        );
        assert_eq!(settlement_for("invoice.paid", None), None);
    }
}
