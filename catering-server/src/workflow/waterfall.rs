//! Payment waterfall
//!
//! Milestone and invoice statuses are a view over the ledger: they are
//! recomputed from the sum of completed transactions every time, never
//! updated incrementally. Duplicate or re-ordered webhook deliveries
//! therefore converge to the same state.

use serde::Serialize;
use shared::models::{InvoiceStatus, MilestoneStatus, PaymentInput, PaymentMilestone, TransactionStatus};
use sqlx::SqliteConnection;

use super::{WorkflowService, Warnings};
use crate::db::{RepoError, invoices, milestones, transactions};
use crate::error::{Entity, WorkflowError, WorkflowResult};

/// Version races with a concurrent writer are retried this many times
const MAX_ATTEMPTS: usize = 3;

/// Allocate `total_paid` left to right over milestones already in
/// waterfall order (due-now first, then ascending due date).
pub fn allocate(milestones: &[PaymentMilestone], total_paid: i64) -> Vec<MilestoneStatus> {
    let mut cumulative = 0i64;
    milestones
        .iter()
        .map(|m| {
            let before = cumulative;
            cumulative += m.amount_cents;
            if total_paid >= cumulative {
                MilestoneStatus::Paid
            } else if total_paid > before {
                MilestoneStatus::Partial
            } else {
                MilestoneStatus::Pending
            }
        })
        .collect()
}

/// Invoice status implied by the paid amount
///
/// Only accepted invoices move; drafts, sent or viewed estimates and
/// cancelled invoices keep their status, as do unpaid ones. An overdue
/// invoice that is still short stays overdue.
pub fn derive_invoice_status(
    current: InvoiceStatus,
    total_cents: i64,
    total_paid: i64,
) -> InvoiceStatus {
    if !current.is_accepted() || total_paid <= 0 {
        return current;
    }
    if total_cents > 0 && total_paid >= total_cents {
        InvoiceStatus::Paid
    } else if total_paid < total_cents {
        match current {
            InvoiceStatus::Overdue => InvoiceStatus::Overdue,
            _ => InvoiceStatus::PartiallyPaid,
        }
    } else {
        current
    }
}

/// Sort key for waterfall order
pub(crate) fn sort_for_waterfall(milestones: &mut [PaymentMilestone]) {
    milestones.sort_by(|a, b| {
        (a.due_date.is_some(), a.due_date, a.sort_order).cmp(&(
            b.due_date.is_some(),
            b.due_date,
            b.sort_order,
        ))
    });
}

/// Remaining amount of the earliest milestone not yet covered, or of the
/// invoice itself when the milestones are all covered
pub fn next_outstanding(milestones: &[PaymentMilestone], total_cents: i64, total_paid: i64) -> i64 {
    let mut cumulative = 0i64;
    for m in milestones {
        cumulative += m.amount_cents;
        if total_paid < cumulative {
            return cumulative - total_paid;
        }
    }
    (total_cents - total_paid).max(0)
}

#[derive(Debug, Clone, Serialize)]
pub struct MilestoneState {
    pub milestone_id: i64,
    pub amount_cents: i64,
    pub status: MilestoneStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaterfallOutcome {
    pub invoice_id: i64,
    pub total_paid_cents: i64,
    pub invoice_status: InvoiceStatus,
    pub milestones: Vec<MilestoneState>,
    /// Number of milestone rows written
    pub milestones_updated: usize,
    pub invoice_updated: bool,
}

/// Recompute and persist on an open connection / transaction
pub(crate) async fn apply_in(
    conn: &mut SqliteConnection,
    invoice_id: i64,
) -> WorkflowResult<WaterfallOutcome> {
    let invoice = invoices::find_by_id(conn, invoice_id)
        .await?
        .ok_or_else(|| WorkflowError::not_found(Entity::Invoice, invoice_id))?;

    let mut rows = milestones::find_by_invoice(conn, invoice_id).await?;
    sort_for_waterfall(&mut rows);
    let total_paid = transactions::sum_completed(conn, invoice_id).await?;

    let statuses = allocate(&rows, total_paid);
    let mut milestones_updated = 0;
    for (row, status) in rows.iter().zip(&statuses) {
        if row.status != *status {
            milestones::update_status(conn, row.id, *status).await?;
            milestones_updated += 1;
        }
    }

    let derived = derive_invoice_status(invoice.workflow_status, invoice.total_cents, total_paid);
    let invoice_updated = derived != invoice.workflow_status;
    if invoice_updated {
        invoices::update_status(conn, invoice_id, invoice.version, derived)
            .await
            .map_err(|e| match e {
                RepoError::Conflict(_) => WorkflowError::OptimisticLockConflict {
                    invoice_id,
                    expected_version: invoice.version,
                },
                other => other.into(),
            })?;
        tracing::info!(
            invoice_id,
            total_paid,
            from = %invoice.workflow_status,
            to = %derived,
            "Invoice status derived from payments"
        );
    }

    Ok(WaterfallOutcome {
        invoice_id,
        total_paid_cents: total_paid,
        invoice_status: derived,
        milestones: rows
            .iter()
            .zip(statuses)
            .map(|(m, status)| MilestoneState {
                milestone_id: m.id,
                amount_cents: m.amount_cents,
                status,
            })
            .collect(),
        milestones_updated,
        invoice_updated,
    })
}

/// Payment recorded against an invoice, with the resulting waterfall
#[derive(Debug, Clone, Serialize)]
pub struct PaymentOutcome {
    /// `false` when the gateway reference had already been recorded
    pub recorded: bool,
    pub waterfall: WaterfallOutcome,
    pub warnings: Warnings,
}

impl WorkflowService {
    /// Recompute milestone and invoice statuses from the ledger
    pub async fn apply_waterfall(&self, invoice_id: i64) -> WorkflowResult<WaterfallOutcome> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut tx = self.pool().begin().await?;
            match apply_in(&mut *tx, invoice_id).await {
                Ok(outcome) => {
                    tx.commit().await?;
                    return Ok(outcome);
                }
                Err(WorkflowError::OptimisticLockConflict { .. }) if attempt < MAX_ATTEMPTS => {
                    tracing::debug!(invoice_id, attempt, "Waterfall raced a concurrent write, retrying");
                }
                Err(e) => {
                    tracing::error!(invoice_id, error = %e, "Waterfall failed");
                    return Err(e);
                }
            }
        }
    }

    /// Record a captured payment and run the waterfall in one transaction
    pub async fn record_payment(
        &self,
        invoice_id: i64,
        payment: &PaymentInput,
    ) -> WorkflowResult<PaymentOutcome> {
        if payment.amount_cents <= 0 {
            return Err(WorkflowError::Validation(format!(
                "Payment amount must be positive, got {}",
                payment.amount_cents
            )));
        }
        if payment.gateway_ref.trim().is_empty() {
            return Err(WorkflowError::Validation("gateway_ref must not be empty".into()));
        }

        let mut tx = self.pool().begin().await?;
        let invoice = invoices::find_by_id(&mut *tx, invoice_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(Entity::Invoice, invoice_id))?;
        if !invoice.workflow_status.is_accepted() {
            tracing::warn!(invoice_id, status = %invoice.workflow_status, "Rejected payment on unaccepted invoice");
            return Err(WorkflowError::invalid_transition(
                Entity::Invoice,
                invoice.workflow_status,
                InvoiceStatus::Paid,
            ));
        }

        let recorded = transactions::insert(
            &mut *tx,
            invoice_id,
            payment.amount_cents,
            TransactionStatus::Completed,
            &payment.gateway_ref,
            &payment.method,
        )
        .await?;
        if !recorded {
            tracing::info!(invoice_id, gateway_ref = %payment.gateway_ref, "Duplicate payment ignored");
        }
        let waterfall = apply_in(&mut *tx, invoice_id).await?;
        tx.commit().await?;

        tracing::info!(
            invoice_id,
            amount_cents = payment.amount_cents,
            total_paid = waterfall.total_paid_cents,
            status = %waterfall.invoice_status,
            "Payment recorded"
        );

        let warnings = self
            .reconcile(invoice.quote_id)
            .await
            .map(|sync| sync.warnings)
            .unwrap_or_else(|e| {
                tracing::warn!(invoice_id, error = %e, "Post-payment reconcile failed");
                Vec::new()
            });

        Ok(PaymentOutcome {
            recorded,
            waterfall,
            warnings,
        })
    }

    /// Settle a gateway transaction (webhook) and re-run the waterfall
    pub async fn settle_gateway_payment(
        &self,
        gateway_ref: &str,
        status: TransactionStatus,
    ) -> WorkflowResult<Option<WaterfallOutcome>> {
        let mut conn = self.pool().acquire().await?;
        let Some(txn) = transactions::find_by_gateway_ref(&mut conn, gateway_ref).await? else {
            tracing::warn!(gateway_ref, "No transaction for gateway reference");
            return Ok(None);
        };
        let changed = transactions::settle(&mut conn, gateway_ref, status).await?;
        drop(conn);
        if changed {
            tracing::info!(invoice_id = txn.invoice_id, gateway_ref, ?status, "Gateway transaction settled");
        }

        let outcome = self.apply_waterfall(txn.invoice_id).await?;
        if status == TransactionStatus::Completed {
            match self.find_invoice(txn.invoice_id).await {
                Ok(invoice) => {
                    if let Err(e) = self.reconcile(invoice.quote_id).await {
                        tracing::warn!(invoice_id = txn.invoice_id, error = %e, "Post-payment reconcile failed");
                    }
                }
                Err(e) => {
                    tracing::warn!(invoice_id = txn.invoice_id, error = %e, "Post-payment invoice lookup failed, quote not reconciled");
                }
            }
        }
        Ok(Some(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use shared::models::MilestoneType;

    fn milestone(id: i64, amount_cents: i64, due: Option<NaiveDate>, sort_order: i32) -> PaymentMilestone {
        PaymentMilestone {
            id,
            invoice_id: 1,
            milestone_type: MilestoneType::Milestone,
            description: String::new(),
            percentage_bps: 0,
            amount_cents,
            due_date: due,
            status: MilestoneStatus::Pending,
            sort_order,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn two_part() -> Vec<PaymentMilestone> {
        vec![
            milestone(1, 400_000, None, 0),
            milestone(2, 600_000, NaiveDate::from_ymd_opt(2027, 1, 1), 1),
        ]
    }

    #[test]
    fn test_allocate_full_payment() {
        let statuses = allocate(&two_part(), 1_000_000);
        assert_eq!(statuses, vec![MilestoneStatus::Paid, MilestoneStatus::Paid]);
    }

    #[test]
    fn test_allocate_partial_second() {
        let statuses = allocate(&two_part(), 600_000);
        assert_eq!(statuses, vec![MilestoneStatus::Paid, MilestoneStatus::Partial]);
    }

    #[test]
    fn test_allocate_boundaries() {
        assert_eq!(
            allocate(&two_part(), 0),
            vec![MilestoneStatus::Pending, MilestoneStatus::Pending]
        );
        assert_eq!(
            allocate(&two_part(), 399_999),
            vec![MilestoneStatus::Partial, MilestoneStatus::Pending]
        );
        assert_eq!(
            allocate(&two_part(), 400_000),
            vec![MilestoneStatus::Paid, MilestoneStatus::Pending]
        );
        assert_eq!(
            allocate(&two_part(), 400_001),
            vec![MilestoneStatus::Paid, MilestoneStatus::Partial]
        );
    }

    #[test]
    fn test_allocate_is_monotonic() {
        let rows = vec![
            milestone(1, 100, None, 0),
            milestone(2, 250, NaiveDate::from_ymd_opt(2027, 1, 1), 1),
            milestone(3, 75, NaiveDate::from_ymd_opt(2027, 2, 1), 2),
        ];
        let rank = |s: &MilestoneStatus| match s {
            MilestoneStatus::Paid => 2,
            MilestoneStatus::Partial => 1,
            MilestoneStatus::Pending => 0,
        };
        for paid in 0..=500 {
            let statuses = allocate(&rows, paid);
            for pair in statuses.windows(2) {
                // A later milestone never gets ahead of an earlier one
                assert!(rank(&pair[0]) >= rank(&pair[1]), "paid={paid}: {statuses:?}");
                if pair[1] != MilestoneStatus::Pending {
                    assert_eq!(pair[0], MilestoneStatus::Paid);
                }
            }
        }
    }

    #[test]
    fn test_overpayment_marks_everything_paid() {
        assert_eq!(
            allocate(&two_part(), 2_000_000),
            vec![MilestoneStatus::Paid, MilestoneStatus::Paid]
        );
    }

    #[test]
    fn test_sort_for_waterfall() {
        let mut rows = vec![
            milestone(3, 1, NaiveDate::from_ymd_opt(2027, 5, 1), 0),
            milestone(2, 1, NaiveDate::from_ymd_opt(2027, 1, 1), 5),
            milestone(1, 1, None, 9),
        ];
        sort_for_waterfall(&mut rows);
        let ids: Vec<i64> = rows.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_derive_invoice_status() {
        use InvoiceStatus::*;
        assert_eq!(derive_invoice_status(PaymentPending, 1_000, 1_000), Paid);
        assert_eq!(derive_invoice_status(Approved, 1_000, 1_500), Paid);
        assert_eq!(derive_invoice_status(Approved, 1_000, 600), PartiallyPaid);
        assert_eq!(derive_invoice_status(Approved, 1_000, 0), Approved);
        assert_eq!(derive_invoice_status(Overdue, 1_000, 600), Overdue);
        assert_eq!(derive_invoice_status(Overdue, 1_000, 1_000), Paid);
        assert_eq!(derive_invoice_status(Cancelled, 1_000, 1_000), Cancelled);
        // Money against an unaccepted estimate does not advance it
        assert_eq!(derive_invoice_status(Draft, 1_000, 1_000), Draft);
        assert_eq!(derive_invoice_status(Sent, 1_000, 600), Sent);
        assert_eq!(derive_invoice_status(Viewed, 1_000, 1_000), Viewed);
        // Price went up after full payment
        assert_eq!(derive_invoice_status(Paid, 1_200, 1_000), PartiallyPaid);
        // Zero total never becomes paid
        assert_eq!(derive_invoice_status(Approved, 0, 0), Approved);
    }

    #[test]
    fn test_next_outstanding() {
        let rows = two_part();
        assert_eq!(next_outstanding(&rows, 1_000_000, 0), 400_000);
        assert_eq!(next_outstanding(&rows, 1_000_000, 100_000), 300_000);
        assert_eq!(next_outstanding(&rows, 1_000_000, 400_000), 600_000);
        assert_eq!(next_outstanding(&rows, 1_000_000, 1_000_000), 0);
        // Total raised after the schedule was generated
        assert_eq!(next_outstanding(&rows, 1_036_000, 1_000_000), 36_000);
        assert_eq!(next_outstanding(&[], 5_000, 1_000), 4_000);
    }
}
