//! Quote / invoice status reconciliation
//!
//! Quote and invoice statuses are written by different actors (admin,
//! customer portal, payment webhooks). [`WorkflowService::reconcile`] pulls
//! the quote forward to what its invoice implies; it never moves a quote
//! backwards and never touches a completed or cancelled quote.

use serde::Serialize;
use shared::models::{CustomerType, InvoiceStatus, QuoteStatus};

use super::{WorkflowService, Warnings};
use crate::db::{RepoError, invoices, quotes};
use crate::error::{Entity, WorkflowError, WorkflowResult};

/// Audit marker recorded on synchronizer writes
pub const SYNC_MARKER: &str = "system_sync";

/// Minimum quote status implied by the invoice
///
/// A standard booking is confirmed once it is paid. Government customers pay
/// on Net-30 terms after the event, so acceptance alone confirms them.
pub fn required_quote_status(
    invoice_status: InvoiceStatus,
    customer_type: CustomerType,
) -> Option<QuoteStatus> {
    use InvoiceStatus::*;
    match (invoice_status, customer_type) {
        (Draft | Cancelled, _) => None,
        (Paid, _) => Some(QuoteStatus::Confirmed),
        (status, CustomerType::Government) if status.is_accepted() => Some(QuoteStatus::Confirmed),
        (Sent | Viewed | Approved | PaymentPending | PartiallyPaid | Overdue, _) => {
            Some(QuoteStatus::Estimated)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub quote_id: i64,
    pub previous: QuoteStatus,
    pub current: QuoteStatus,
    pub changed: bool,
    pub warnings: Warnings,
}

impl SyncOutcome {
    fn unchanged(quote_id: i64, status: QuoteStatus) -> Self {
        Self {
            quote_id,
            previous: status,
            current: status,
            changed: false,
            warnings: Vec::new(),
        }
    }
}

impl WorkflowService {
    /// Bring the quote's status up to what its invoice implies
    pub async fn reconcile(&self, quote_id: i64) -> WorkflowResult<SyncOutcome> {
        let mut conn = self.pool().acquire().await?;
        let quote = quotes::find_by_id(&mut conn, quote_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(Entity::Quote, quote_id))?;
        let current = quote.workflow_status;

        let Some(invoice) = invoices::find_by_quote(&mut conn, quote_id).await? else {
            return Ok(SyncOutcome::unchanged(quote_id, current));
        };
        if current.is_terminal() {
            return Ok(SyncOutcome::unchanged(quote_id, current));
        }
        let Some(required) = required_quote_status(invoice.workflow_status, quote.customer_type)
        else {
            return Ok(SyncOutcome::unchanged(quote_id, current));
        };
        if current.is_at_least(required) {
            return Ok(SyncOutcome::unchanged(quote_id, current));
        }

        match quotes::update_status(&mut conn, quote_id, current, required, SYNC_MARKER).await {
            Ok(()) => {}
            Err(RepoError::Conflict(_)) => {
                // A concurrent writer moved the quote; the next reconcile sees its result
                tracing::debug!(quote_id, "Quote changed during reconcile, skipping");
                let now = quotes::find_by_id(&mut conn, quote_id)
                    .await?
                    .map_or(current, |q| q.workflow_status);
                return Ok(SyncOutcome::unchanged(quote_id, now));
            }
            Err(e) => return Err(e.into()),
        }
        drop(conn);

        tracing::info!(
            quote_id,
            invoice_id = invoice.id,
            invoice_status = %invoice.workflow_status,
            from = %current,
            to = %required,
            "Quote status reconciled"
        );

        let mut warnings = Vec::new();
        if required == QuoteStatus::Confirmed
            && let Some(w) = self.notifier.booking_confirmed(&quote, &invoice).await
        {
            warnings.push(w);
        }

        Ok(SyncOutcome {
            quote_id,
            previous: current,
            current: required,
            changed: true,
            warnings,
        })
    }
}
