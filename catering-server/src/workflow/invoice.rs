//! Invoice lifecycle
//!
//! `draft -> sent -> viewed -> approved -> payment_pending / partially_paid
//! -> paid`, with `overdue` set by the sweep and `cancelled` from any unpaid
//! status. Line items can only change while the invoice is a draft; every
//! pricing write goes through the version check.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use shared::error::{AppError, ErrorCode};
use shared::models::{
    Invoice, InvoiceCreate, InvoiceStatus, LineItem, LineItemInput, PaymentMilestone,
    PaymentTransaction, Quote, TransactionStatus, compute_tax,
};
use sqlx::SqliteConnection;

use super::schedule::{SchedulePolicy, generate_schedule};
use super::waterfall::{self, next_outstanding, sort_for_waterfall};
use super::{WorkflowService, Warnings};
use crate::db::{RepoError, invoices, line_items, milestones, quotes, transactions};
use crate::error::{DownstreamError, Entity, WorkflowError, WorkflowResult};
use crate::stripe::{CheckoutRequest, CheckoutSession};
use crate::validation::{
    MAX_NAME_LEN, MAX_NOTE_LEN, MAX_SHORT_TEXT_LEN, MAX_TAX_RATE_BPS, validate_optional_text,
    validate_required_text,
};

/// Gateway method recorded on checkout transactions
const STRIPE_METHOD: &str = "stripe";

/// Invoice with everything hanging off it
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceDetail {
    pub invoice: Invoice,
    pub line_items: Vec<LineItem>,
    pub milestones: Vec<PaymentMilestone>,
    pub transactions: Vec<PaymentTransaction>,
    pub total_paid_cents: i64,
}

/// Status change with the follow-up warnings
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceOutcome {
    pub invoice: Invoice,
    pub warnings: Warnings,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerApproval {
    pub invoice: Invoice,
    pub milestones: Vec<PaymentMilestone>,
    /// Payment link for the amount due now, if any
    pub checkout: Option<CheckoutSession>,
    pub warnings: Warnings,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutOutcome {
    pub invoice_id: i64,
    pub amount_cents: i64,
    pub session: CheckoutSession,
}

fn validate_line_item(input: &LineItemInput) -> WorkflowResult<()> {
    validate_required_text(&input.title, "title", MAX_NAME_LEN)?;
    validate_optional_text(&input.description, "description", MAX_NOTE_LEN)?;
    validate_optional_text(&input.category, "category", MAX_SHORT_TEXT_LEN)?;
    if input.quantity <= 0 {
        return Err(WorkflowError::Validation(format!(
            "quantity must be positive, got {}",
            input.quantity
        )));
    }
    Ok(())
}

fn not_draft(invoice: &Invoice) -> WorkflowError {
    WorkflowError::App(AppError::with_message(
        ErrorCode::InvoiceNotDraft,
        format!("Invoice {} is {} and no longer editable", invoice.id, invoice.workflow_status),
    ))
}

fn lock_conflict(err: RepoError, invoice: &Invoice) -> WorkflowError {
    match err {
        RepoError::Conflict(_) => WorkflowError::OptimisticLockConflict {
            invoice_id: invoice.id,
            expected_version: invoice.version,
        },
        other => other.into(),
    }
}

async fn load_invoice(conn: &mut SqliteConnection, id: i64) -> WorkflowResult<Invoice> {
    invoices::find_by_id(conn, id)
        .await?
        .ok_or_else(|| WorkflowError::not_found(Entity::Invoice, id))
}

async fn load_quote(conn: &mut SqliteConnection, id: i64) -> WorkflowResult<Quote> {
    quotes::find_by_id(conn, id)
        .await?
        .ok_or_else(|| WorkflowError::not_found(Entity::Quote, id))
}

async fn load_by_token(conn: &mut SqliteConnection, token: &str) -> WorkflowResult<Invoice> {
    invoices::find_by_token(conn, token).await?.ok_or_else(|| {
        tracing::warn!("Invoice access with unknown token");
        WorkflowError::App(AppError::new(ErrorCode::InvoiceTokenInvalid))
    })
}

/// Checked, version-guarded status write
async fn transition(
    conn: &mut SqliteConnection,
    invoice: &Invoice,
    next: InvoiceStatus,
) -> WorkflowResult<()> {
    if !invoice.workflow_status.can_transition_to(next) {
        return Err(WorkflowError::invalid_transition(
            Entity::Invoice,
            invoice.workflow_status,
            next,
        ));
    }
    invoices::update_status(conn, invoice.id, invoice.version, next)
        .await
        .map_err(|e| lock_conflict(e, invoice))?;
    Ok(())
}

/// Recompute totals from the line items
async fn reprice(conn: &mut SqliteConnection, invoice: &Invoice) -> WorkflowResult<()> {
    let subtotal = line_items::subtotal(conn, invoice.id).await?;
    let tax = compute_tax(subtotal, invoice.tax_rate_bps);
    invoices::update_totals(conn, invoice.id, invoice.version, subtotal, tax)
        .await
        .map_err(|e| lock_conflict(e, invoice))?;
    Ok(())
}

/// Persist a payment schedule for the invoice's current total
async fn generate_in(
    conn: &mut SqliteConnection,
    invoice: &Invoice,
    quote: &Quote,
    policy: &SchedulePolicy,
) -> WorkflowResult<Vec<PaymentMilestone>> {
    if milestones::count_by_invoice(conn, invoice.id).await? > 0 {
        return Err(WorkflowError::App(AppError::with_message(
            ErrorCode::MilestonesAlreadyGenerated,
            format!("Invoice {} already has a payment schedule", invoice.id),
        )));
    }
    let schedule = generate_schedule(
        invoice.total_cents,
        quote.event_date,
        Utc::now(),
        quote.customer_type,
        policy,
    );
    let rows: Vec<_> = schedule
        .iter()
        .enumerate()
        .map(|(i, m)| m.to_new_milestone(i as i32))
        .collect();
    milestones::insert_batch(conn, invoice.id, &rows).await?;

    tracing::info!(
        invoice_id = invoice.id,
        total_cents = invoice.total_cents,
        milestones = rows.len(),
        customer_type = ?quote.customer_type,
        "Payment schedule generated"
    );
    Ok(milestones::find_by_invoice(conn, invoice.id).await?)
}

impl WorkflowService {
    pub async fn find_invoice(&self, id: i64) -> WorkflowResult<Invoice> {
        let mut conn = self.pool().acquire().await?;
        load_invoice(&mut conn, id).await
    }

    pub async fn invoice_detail(&self, id: i64) -> WorkflowResult<InvoiceDetail> {
        let mut conn = self.pool().acquire().await?;
        let invoice = load_invoice(&mut conn, id).await?;
        detail_of(&mut conn, invoice).await
    }

    /// Customer portal view; does not record the view
    pub async fn invoice_detail_by_token(&self, token: &str) -> WorkflowResult<InvoiceDetail> {
        let mut conn = self.pool().acquire().await?;
        let invoice = load_by_token(&mut conn, token).await?;
        detail_of(&mut conn, invoice).await
    }

    /// Create the estimate for a quote, priced from its line items
    pub async fn create_invoice(&self, data: &InvoiceCreate) -> WorkflowResult<Invoice> {
        if !(0..=MAX_TAX_RATE_BPS).contains(&data.tax_rate_bps) {
            return Err(WorkflowError::Validation(format!(
                "tax_rate_bps must be between 0 and {MAX_TAX_RATE_BPS}, got {}",
                data.tax_rate_bps
            )));
        }
        for item in &data.line_items {
            validate_line_item(item)?;
        }

        let mut tx = self.pool().begin().await?;
        let quote = load_quote(&mut *tx, data.quote_id).await?;
        if quote.workflow_status.is_terminal() {
            return Err(WorkflowError::invalid_transition(
                Entity::Quote,
                quote.workflow_status,
                "invoiced",
            ));
        }
        let invoice =
            invoices::create(&mut *tx, quote.id, data.document_type, data.tax_rate_bps).await?;
        for item in &data.line_items {
            line_items::insert(&mut *tx, invoice.id, item).await?;
        }
        reprice(&mut *tx, &invoice).await?;
        let invoice = load_invoice(&mut *tx, invoice.id).await?;
        tx.commit().await?;

        tracing::info!(
            invoice_id = invoice.id,
            quote_id = quote.id,
            total_cents = invoice.total_cents,
            line_items = data.line_items.len(),
            "Invoice created"
        );
        Ok(invoice)
    }

    pub async fn add_line_item(
        &self,
        invoice_id: i64,
        input: &LineItemInput,
    ) -> WorkflowResult<Invoice> {
        validate_line_item(input)?;
        let mut tx = self.pool().begin().await?;
        let invoice = load_invoice(&mut *tx, invoice_id).await?;
        if !invoice.is_draft {
            return Err(not_draft(&invoice));
        }
        let item = line_items::insert(&mut *tx, invoice_id, input).await?;
        reprice(&mut *tx, &invoice).await?;
        let invoice = load_invoice(&mut *tx, invoice_id).await?;
        tx.commit().await?;

        tracing::info!(invoice_id, line_item_id = item.id, total_cents = invoice.total_cents, "Line item added");
        Ok(invoice)
    }

    pub async fn remove_line_item(&self, invoice_id: i64, item_id: i64) -> WorkflowResult<Invoice> {
        let mut tx = self.pool().begin().await?;
        let invoice = load_invoice(&mut *tx, invoice_id).await?;
        if !invoice.is_draft {
            return Err(not_draft(&invoice));
        }
        line_items::delete(&mut *tx, invoice_id, item_id)
            .await
            .map_err(|e| match e {
                RepoError::NotFound(_) => WorkflowError::not_found(Entity::LineItem, item_id),
                other => other.into(),
            })?;
        reprice(&mut *tx, &invoice).await?;
        let invoice = load_invoice(&mut *tx, invoice_id).await?;
        tx.commit().await?;

        tracing::info!(invoice_id, line_item_id = item_id, total_cents = invoice.total_cents, "Line item removed");
        Ok(invoice)
    }

    /// `draft -> sent`, emails the customer their portal link
    pub async fn send_invoice(&self, invoice_id: i64) -> WorkflowResult<InvoiceOutcome> {
        let mut conn = self.pool().acquire().await?;
        let invoice = load_invoice(&mut conn, invoice_id).await?;
        if line_items::find_by_invoice(&mut conn, invoice_id).await?.is_empty() {
            return Err(WorkflowError::Validation(format!(
                "Invoice {invoice_id} has no line items"
            )));
        }
        transition(&mut conn, &invoice, InvoiceStatus::Sent).await?;
        let invoice = load_invoice(&mut conn, invoice_id).await?;
        let quote = load_quote(&mut conn, invoice.quote_id).await?;
        drop(conn);

        tracing::info!(invoice_id, quote_id = quote.id, "Invoice sent");

        let mut warnings: Warnings = self.notifier.invoice_sent(&quote, &invoice).await.into_iter().collect();
        warnings.extend(self.reconcile_warnings(quote.id).await);
        Ok(InvoiceOutcome { invoice, warnings })
    }

    /// First portal visit: `sent -> viewed`. Later visits change nothing.
    pub async fn record_view(&self, token: &str) -> WorkflowResult<Invoice> {
        let mut conn = self.pool().acquire().await?;
        let invoice = load_by_token(&mut conn, token).await?;
        if invoice.workflow_status != InvoiceStatus::Sent {
            return Ok(invoice);
        }
        match transition(&mut conn, &invoice, InvoiceStatus::Viewed).await {
            Ok(()) => tracing::info!(invoice_id = invoice.id, "Invoice viewed"),
            // Concurrent view or approval already moved it on
            Err(WorkflowError::OptimisticLockConflict { .. }) => {}
            Err(e) => return Err(e),
        }
        load_invoice(&mut conn, invoice.id).await
    }

    /// Customer accepts the estimate from the portal
    ///
    /// Generates the payment schedule when none exists and, if something
    /// is due now, a checkout link for it.
    pub async fn customer_approve(&self, token: &str) -> WorkflowResult<CustomerApproval> {
        let mut tx = self.pool().begin().await?;
        let invoice = load_by_token(&mut *tx, token).await?;
        let quote = load_quote(&mut *tx, invoice.quote_id).await?;
        transition(&mut *tx, &invoice, InvoiceStatus::Approved).await?;
        let invoice = load_invoice(&mut *tx, invoice.id).await?;
        let schedule = if milestones::count_by_invoice(&mut *tx, invoice.id).await? == 0 {
            generate_in(&mut *tx, &invoice, &quote, &self.settings().schedule).await?
        } else {
            milestones::find_by_invoice(&mut *tx, invoice.id).await?
        };
        tx.commit().await?;

        tracing::info!(invoice_id = invoice.id, quote_id = quote.id, "Invoice approved by customer");

        let mut warnings = self.reconcile_warnings(quote.id).await;
        let mut checkout = None;
        if schedule.iter().any(|m| m.due_date.is_none()) {
            match self.create_checkout(invoice.id).await {
                Ok(outcome) => checkout = Some(outcome.session),
                Err(e) => {
                    tracing::warn!(invoice_id = invoice.id, error = %e, "Payment link creation failed");
                    warnings.push(DownstreamError::PaymentLink {
                        reason: e.to_string(),
                    });
                }
            }
        }

        let mut conn = self.pool().acquire().await?;
        let invoice = load_invoice(&mut conn, invoice.id).await?;
        let milestones = milestones::find_by_invoice(&mut conn, invoice.id).await?;
        Ok(CustomerApproval {
            invoice,
            milestones,
            checkout,
            warnings,
        })
    }

    /// Build the payment schedule for an invoice (once)
    pub async fn generate_milestones(&self, invoice_id: i64) -> WorkflowResult<Vec<PaymentMilestone>> {
        let mut tx = self.pool().begin().await?;
        let invoice = load_invoice(&mut *tx, invoice_id).await?;
        if invoice.workflow_status == InvoiceStatus::Cancelled {
            return Err(WorkflowError::invalid_transition(
                Entity::Invoice,
                invoice.workflow_status,
                "scheduled",
            ));
        }
        let quote = load_quote(&mut *tx, invoice.quote_id).await?;
        let rows = generate_in(&mut *tx, &invoice, &quote, &self.settings().schedule).await?;
        // Payments taken before the schedule existed are allocated now
        if transactions::sum_completed(&mut *tx, invoice_id).await? > 0 {
            waterfall::apply_in(&mut *tx, invoice_id).await?;
        }
        tx.commit().await?;
        Ok(rows)
    }

    pub async fn list_milestones(&self, invoice_id: i64) -> WorkflowResult<Vec<PaymentMilestone>> {
        let mut conn = self.pool().acquire().await?;
        load_invoice(&mut conn, invoice_id).await?;
        Ok(milestones::find_by_invoice(&mut conn, invoice_id).await?)
    }

    /// Checkout session for the next amount owed
    pub async fn create_checkout(&self, invoice_id: i64) -> WorkflowResult<CheckoutOutcome> {
        let mut conn = self.pool().acquire().await?;
        let invoice = load_invoice(&mut conn, invoice_id).await?;
        if !invoice.workflow_status.is_accepted() {
            return Err(WorkflowError::invalid_transition(
                Entity::Invoice,
                invoice.workflow_status,
                InvoiceStatus::PaymentPending,
            ));
        }
        let quote = load_quote(&mut conn, invoice.quote_id).await?;
        let mut rows = milestones::find_by_invoice(&mut conn, invoice_id).await?;
        sort_for_waterfall(&mut rows);
        let paid = transactions::sum_completed(&mut conn, invoice_id).await?;
        drop(conn);

        let amount_cents = next_outstanding(&rows, invoice.total_cents, paid);
        if amount_cents <= 0 {
            return Err(WorkflowError::App(AppError::with_message(
                ErrorCode::NothingOutstanding,
                format!("Invoice {invoice_id} has nothing outstanding"),
            )));
        }

        let portal = self.notifier.portal_link(&invoice);
        let success_url = format!("{portal}?payment=success");
        let cancel_url = format!("{portal}?payment=cancelled");
        let description = format!("Catering for {} on {}", quote.customer_name, quote.event_date);
        let session = self
            .payments
            .create_checkout_session(&CheckoutRequest {
                invoice_id,
                amount_cents,
                description: &description,
                customer_email: &quote.customer_email,
                success_url: &success_url,
                cancel_url: &cancel_url,
            })
            .await
            .map_err(|e| {
                tracing::error!(invoice_id, error = %e, "Checkout session creation failed");
                WorkflowError::App(AppError::with_message(
                    ErrorCode::PaymentLinkFailed,
                    e.to_string(),
                ))
            })?;

        let mut tx = self.pool().begin().await?;
        transactions::insert(
            &mut *tx,
            invoice_id,
            amount_cents,
            TransactionStatus::Pending,
            &session.id,
            STRIPE_METHOD,
        )
        .await?;
        let current = load_invoice(&mut *tx, invoice_id).await?;
        if current.workflow_status == InvoiceStatus::Approved {
            transition(&mut *tx, &current, InvoiceStatus::PaymentPending).await?;
        }
        tx.commit().await?;

        tracing::info!(invoice_id, amount_cents, session_id = %session.id, "Checkout created");
        Ok(CheckoutOutcome {
            invoice_id,
            amount_cents,
            session,
        })
    }

    pub async fn cancel_invoice(&self, invoice_id: i64) -> WorkflowResult<Invoice> {
        let mut conn = self.pool().acquire().await?;
        let invoice = load_invoice(&mut conn, invoice_id).await?;
        transition(&mut conn, &invoice, InvoiceStatus::Cancelled).await?;
        tracing::info!(invoice_id, from = %invoice.workflow_status, "Invoice cancelled");
        load_invoice(&mut conn, invoice_id).await
    }

    /// Flag invoices with a past-due unpaid milestone. Returns the ids flagged.
    pub async fn mark_overdue(&self, today: NaiveDate) -> WorkflowResult<Vec<i64>> {
        let mut conn = self.pool().acquire().await?;
        let candidates = invoices::find_past_due(&mut conn, today).await?;
        let mut flagged = Vec::with_capacity(candidates.len());
        for invoice in candidates {
            match transition(&mut conn, &invoice, InvoiceStatus::Overdue).await {
                Ok(()) => flagged.push(invoice.id),
                Err(WorkflowError::OptimisticLockConflict { .. }) => {
                    tracing::debug!(invoice_id = invoice.id, "Invoice changed during overdue sweep, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        if !flagged.is_empty() {
            tracing::info!(count = flagged.len(), ?flagged, "Invoices marked overdue");
        }
        Ok(flagged)
    }

    /// Reconcile after a status change; failures only cost the warnings
    pub(crate) async fn reconcile_warnings(&self, quote_id: i64) -> Warnings {
        match self.reconcile(quote_id).await {
            Ok(sync) => sync.warnings,
            Err(e) => {
                tracing::warn!(quote_id, error = %e, "Reconcile failed");
                Vec::new()
            }
        }
    }
}

async fn detail_of(conn: &mut SqliteConnection, invoice: Invoice) -> WorkflowResult<InvoiceDetail> {
    let line_items = line_items::find_by_invoice(conn, invoice.id).await?;
    let milestones = milestones::find_by_invoice(conn, invoice.id).await?;
    let transactions = transactions::find_by_invoice(conn, invoice.id).await?;
    let total_paid_cents = transactions::sum_completed(conn, invoice.id).await?;
    Ok(InvoiceDetail {
        invoice,
        line_items,
        milestones,
        transactions,
        total_paid_cents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::testing::{quote_data, service};
    use chrono::Days;

    fn item(title: &str, quantity: i32, unit_price_cents: i64) -> LineItemInput {
        LineItemInput {
            title: title.into(),
            description: None,
            category: None,
            quantity,
            unit_price_cents,
        }
    }

    #[tokio::test]
    async fn test_create_invoice_prices_line_items() {
        let (svc, _) = service().await;
        let quote = svc.create_quote(&quote_data(60)).await.unwrap();
        let invoice = svc
            .create_invoice(&InvoiceCreate {
                quote_id: quote.id,
                document_type: Default::default(),
                tax_rate_bps: 825,
                line_items: vec![item("Buffet", 100, 4_500), item("Staff", 4, 20_000)],
            })
            .await
            .unwrap();
        assert_eq!(invoice.subtotal_cents, 530_000);
        assert_eq!(invoice.tax_amount_cents, 43_725);
        assert_eq!(invoice.total_cents, 573_725);
        assert!(invoice.is_draft);
        assert_eq!(invoice.version, 2);
    }

    #[tokio::test]
    async fn test_second_invoice_for_quote_rejected() {
        let (svc, _) = service().await;
        let quote = svc.create_quote(&quote_data(60)).await.unwrap();
        let create = InvoiceCreate {
            quote_id: quote.id,
            document_type: Default::default(),
            tax_rate_bps: 0,
            line_items: vec![item("Buffet", 1, 100)],
        };
        svc.create_invoice(&create).await.unwrap();
        let err = svc.create_invoice(&create).await.unwrap_err();
        let app: AppError = err.into();
        assert_eq!(app.code, ErrorCode::AlreadyExists);
    }

    #[tokio::test]
    async fn test_line_items_locked_after_send() {
        let (svc, _) = service().await;
        let quote = svc.create_quote(&quote_data(60)).await.unwrap();
        let invoice = svc
            .create_invoice(&InvoiceCreate {
                quote_id: quote.id,
                document_type: Default::default(),
                tax_rate_bps: 0,
                line_items: vec![item("Buffet", 10, 1_000)],
            })
            .await
            .unwrap();

        let invoice = svc.add_line_item(invoice.id, &item("Bar", 1, 5_000)).await.unwrap();
        assert_eq!(invoice.total_cents, 15_000);

        let sent = svc.send_invoice(invoice.id).await.unwrap();
        assert_eq!(sent.invoice.workflow_status, InvoiceStatus::Sent);
        assert!(!sent.invoice.is_draft);

        let err = svc.add_line_item(invoice.id, &item("Cake", 1, 100)).await.unwrap_err();
        let app: AppError = err.into();
        assert_eq!(app.code, ErrorCode::InvoiceNotDraft);
    }

    #[tokio::test]
    async fn test_cannot_approve_a_draft() {
        let (svc, _) = service().await;
        let quote = svc.create_quote(&quote_data(60)).await.unwrap();
        let invoice = svc
            .create_invoice(&InvoiceCreate {
                quote_id: quote.id,
                document_type: Default::default(),
                tax_rate_bps: 0,
                line_items: vec![item("Buffet", 1, 1_000)],
            })
            .await
            .unwrap();
        let err = svc.customer_approve(&invoice.access_token).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { entity: Entity::Invoice, .. }));
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let (svc, _) = service().await;
        let err = svc.record_view("no-such-token").await.unwrap_err();
        let app: AppError = err.into();
        assert_eq!(app.code, ErrorCode::InvoiceTokenInvalid);
    }

    #[tokio::test]
    async fn test_mark_overdue_flags_past_due_balance() {
        let (svc, _) = service().await;
        let quote = svc.create_quote(&quote_data(60)).await.unwrap();
        let invoice = svc
            .create_invoice(&InvoiceCreate {
                quote_id: quote.id,
                document_type: Default::default(),
                tax_rate_bps: 0,
                line_items: vec![item("Buffet", 100, 10_000)],
            })
            .await
            .unwrap();
        svc.send_invoice(invoice.id).await.unwrap();
        svc.customer_approve(&invoice.access_token).await.unwrap();

        // Balance falls due 14 days before the event
        let today = Utc::now().date_naive();
        assert!(svc.mark_overdue(today).await.unwrap().is_empty());
        let later = today + Days::new(50);
        assert_eq!(svc.mark_overdue(later).await.unwrap(), vec![invoice.id]);
        // Already overdue: not flagged twice
        assert!(svc.mark_overdue(later).await.unwrap().is_empty());
        let invoice = svc.find_invoice(invoice.id).await.unwrap();
        assert_eq!(invoice.workflow_status, InvoiceStatus::Overdue);
    }
}
