//! Outbound email
//!
//! [`Mailer`] is the sending collaborator (`to, subject, html_body`);
//! [`SesMailer`] delivers through AWS SES v2. [`Notifier`] renders the
//! workflow notifications and turns send failures into warnings.

use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_sesv2::Client as SesClient;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use shared::models::{ChangeRequest, Invoice, Quote};
use shared::util::format_cents;

use crate::error::DownstreamError;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), BoxError>;
}

/// AWS SES v2 sender
pub struct SesMailer {
    ses: SesClient,
    from: String,
}

impl SesMailer {
    pub fn new(ses: SesClient, from: impl Into<String>) -> Self {
        Self {
            ses,
            from: from.into(),
        }
    }
}

#[async_trait]
impl Mailer for SesMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), BoxError> {
        let subject = Content::builder().data(subject).build()?;
        let body = Body::builder()
            .html(Content::builder().data(html_body).build()?)
            .build();
        let message = Message::builder().subject(subject).body(body).build();

        self.ses
            .send_email()
            .from_email_address(&self.from)
            .destination(Destination::builder().to_addresses(to).build())
            .content(EmailContent::builder().simple(message).build())
            .send()
            .await?;

        tracing::info!(to = to, "Email sent");
        Ok(())
    }
}

/// Workflow notifications
#[derive(Clone)]
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    admin_email: String,
    portal_base_url: String,
}

impl Notifier {
    pub fn new(
        mailer: Arc<dyn Mailer>,
        admin_email: impl Into<String>,
        portal_base_url: impl Into<String>,
    ) -> Self {
        Self {
            mailer,
            admin_email: admin_email.into(),
            portal_base_url: portal_base_url.into(),
        }
    }

    /// Customer-facing link for an invoice
    pub fn portal_link(&self, invoice: &Invoice) -> String {
        format!(
            "{}/invoice/{}",
            self.portal_base_url.trim_end_matches('/'),
            invoice.access_token
        )
    }

    /// Send one message; a failure is logged and handed back as a warning
    async fn deliver(&self, to: &str, subject: &str, html: &str) -> Option<DownstreamError> {
        match self.mailer.send(to, subject, html).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(to = to, subject = subject, error = %e, "Notification failed");
                Some(DownstreamError::Notification {
                    to: to.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    pub async fn change_request_approved(
        &self,
        cr: &ChangeRequest,
        invoice: Option<&Invoice>,
    ) -> Option<DownstreamError> {
        let cost = cr.final_cost_change_cents.unwrap_or(0);
        let mut html = format!(
            "<p>Your change request has been approved.</p><p>Price adjustment: {}</p>",
            format_cents(cost)
        );
        if let Some(response) = &cr.admin_response {
            html.push_str(&format!("<p>{}</p>", escape_html(response)));
        }
        if let Some(invoice) = invoice {
            html.push_str(&format!(
                "<p>Updated total: {}. <a href=\"{}\">View your invoice</a></p>",
                format_cents(invoice.total_cents),
                self.portal_link(invoice)
            ));
        }
        self.deliver(&cr.customer_email, "Your change request was approved", &html)
            .await
    }

    pub async fn change_request_rejected(&self, cr: &ChangeRequest) -> Option<DownstreamError> {
        let html = format!(
            "<p>We were unable to accommodate your change request.</p><p>{}</p>",
            escape_html(cr.admin_response.as_deref().unwrap_or(""))
        );
        self.deliver(&cr.customer_email, "Update on your change request", &html)
            .await
    }

    /// Admin alert for a request that needs manual review
    pub async fn change_request_needs_review(
        &self,
        cr: &ChangeRequest,
        reason: &str,
    ) -> Option<DownstreamError> {
        let html = format!(
            "<p>Change request {} on invoice {} needs review.</p><p>Customer: {}</p><p>Reason: {}</p><p>Estimated impact: {}</p>",
            cr.id,
            cr.invoice_id,
            escape_html(&cr.customer_email),
            escape_html(reason),
            format_cents(cr.estimated_cost_change_cents.unwrap_or(0))
        );
        self.deliver(&self.admin_email, "Change request needs review", &html)
            .await
    }

    pub async fn booking_confirmed(
        &self,
        quote: &Quote,
        invoice: &Invoice,
    ) -> Option<DownstreamError> {
        let html = format!(
            "<p>Hi {},</p><p>Your event on {} at {} is confirmed.</p><p><a href=\"{}\">View your invoice</a></p>",
            escape_html(&quote.customer_name),
            quote.event_date,
            escape_html(&quote.location),
            self.portal_link(invoice)
        );
        self.deliver(&quote.customer_email, "Your booking is confirmed", &html)
            .await
    }

    pub async fn invoice_sent(&self, quote: &Quote, invoice: &Invoice) -> Option<DownstreamError> {
        let html = format!(
            "<p>Hi {},</p><p>Your estimate for {} is ready: {}.</p><p><a href=\"{}\">Review and approve</a></p>",
            escape_html(&quote.customer_name),
            quote.event_date,
            format_cents(invoice.total_cents),
            self.portal_link(invoice)
        );
        self.deliver(&quote.customer_email, "Your catering estimate", &html)
            .await
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
