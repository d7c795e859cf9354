//! Stripe integration via REST API (no SDK dependency)
//!
//! Only two touch points: creating a one-off Checkout Session for an
//! outstanding invoice amount, and verifying webhook signatures.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Webhook events older than this are rejected (replay protection)
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Checkout request for one invoice payment
#[derive(Debug, Clone)]
pub struct CheckoutRequest<'a> {
    pub invoice_id: i64,
    pub amount_cents: i64,
    pub description: &'a str,
    pub customer_email: &'a str,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    /// Session id, used as the transaction's gateway reference
    pub id: String,
    pub url: String,
}

/// Payment-link collaborator
#[async_trait]
pub trait PaymentLinks: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest<'_>,
    ) -> Result<CheckoutSession, BoxError>;
}

/// Stripe Checkout (payment mode, ad-hoc price)
pub struct StripeCheckout {
    secret_key: String,
    client: reqwest::Client,
}

impl StripeCheckout {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PaymentLinks for StripeCheckout {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest<'_>,
    ) -> Result<CheckoutSession, BoxError> {
        let amount = request.amount_cents.to_string();
        let invoice_id = request.invoice_id.to_string();
        let resp: serde_json::Value = self
            .client
            .post("https://api.stripe.com/v1/checkout/sessions")
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&[
                ("mode", "payment"),
                ("customer_email", request.customer_email),
                ("line_items[0][quantity]", "1"),
                ("line_items[0][price_data][currency]", "usd"),
                ("line_items[0][price_data][unit_amount]", amount.as_str()),
                ("line_items[0][price_data][product_data][name]", request.description),
                ("success_url", request.success_url),
                ("cancel_url", request.cancel_url),
                ("metadata[invoice_id]", invoice_id.as_str()),
            ])
            .send()
            .await?
            .json()
            .await?;

        match (resp["id"].as_str(), resp["url"].as_str()) {
            (Some(id), Some(url)) => {
                tracing::info!(invoice_id = request.invoice_id, session_id = id, "Stripe checkout session created");
                Ok(CheckoutSession {
                    id: id.to_string(),
                    url: url.to_string(),
                })
            }
            _ => Err(format!("Stripe create_checkout failed: {resp}").into()),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Invalid Stripe-Signature header")]
    MalformedHeader,
    #[error("Invalid signature hex")]
    InvalidHex,
    #[error("Invalid timestamp")]
    InvalidTimestamp,
    #[error("Webhook signature mismatch")]
    Mismatch,
    #[error("Webhook timestamp outside tolerance")]
    Expired,
}

/// Verify a Stripe webhook signature (HMAC-SHA256 over `"{t}.{payload}"`)
///
/// Any of the `v1=` signatures may match (Stripe sends several while a
/// secret is being rolled).
pub fn verify_webhook_signature(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
    now_secs: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in sig_header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(v) = part.strip_prefix("v1=") {
            signatures.push(v);
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }

    let mut matched = false;
    for signature in signatures {
        let sig_bytes = hex::decode(signature).map_err(|_| SignatureError::InvalidHex)?;
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .map_err(|_| SignatureError::Mismatch)?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        // constant-time
        if mac.verify_slice(&sig_bytes).is_ok() {
            matched = true;
            break;
        }
    }
    if !matched {
        return Err(SignatureError::Mismatch);
    }

    let ts: i64 = timestamp.parse().map_err(|_| SignatureError::InvalidTimestamp)?;
    if (now_secs - ts).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }
    Ok(())
}
