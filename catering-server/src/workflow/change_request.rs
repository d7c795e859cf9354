//! Change request processor
//!
//! `pending -> approved | rejected`, both terminal. Approval applies the
//! requested changes to the quote, adds a priced adjustment line to the
//! invoice and finalizes the request inside one SQLite transaction: either
//! everything is visible afterwards or the request is still `pending`.
//! Notifications run after commit and only ever produce warnings.

use chrono::Utc;
use serde::Serialize;
use shared::models::{
    Change, ChangeRequest, ChangeRequestApprove, ChangeRequestReject, ChangeRequestStatus,
    ChangeRequestSubmit, Invoice, InvoiceStatus, LineItemInput, Quote, RequestedChanges,
    compute_tax,
};
use sqlx::SqliteConnection;

use super::approval::{ApprovalDecision, evaluate_auto_approval};
use super::{WorkflowService, Warnings, waterfall};
use crate::db::change_requests::{NewChangeRequest, Resolution};
use crate::db::quotes::QuoteEventDetails;
use crate::db::{RepoError, change_requests, invoices, line_items, milestones, quotes, transactions};
use crate::error::{DownstreamError, Entity, WorkflowError, WorkflowResult};
use crate::validation::{MAX_EMAIL_LEN, MAX_NAME_LEN, MAX_NOTE_LEN, validate_optional_text, validate_required_text};

/// Reviewer recorded on rule-approved requests
pub const SYSTEM_REVIEWER: &str = "system";

#[derive(Debug, Clone, Serialize)]
pub struct ChangeRequestOutcome {
    pub change_request: ChangeRequest,
    /// Rule engine result (submission only)
    pub decision: Option<ApprovalDecision>,
    /// Invoice after approval
    pub invoice: Option<Invoice>,
    pub warnings: Warnings,
}

impl WorkflowService {
    /// Run the rule engine against the current quote without storing anything
    pub async fn evaluate_change_request(
        &self,
        quote_id: i64,
        changes: &RequestedChanges,
    ) -> WorkflowResult<ApprovalDecision> {
        changes.validate()?;
        let quote = self.find_quote(quote_id).await?;
        Ok(evaluate_auto_approval(
            changes,
            &quote,
            Utc::now(),
            &self.settings().approval,
        ))
    }

    pub async fn submit_change_request(
        &self,
        req: &ChangeRequestSubmit,
    ) -> WorkflowResult<ChangeRequestOutcome> {
        validate_required_text(&req.customer_email, "customer_email", MAX_EMAIL_LEN)?;
        validate_optional_text(&req.customer_comments, "customer_comments", MAX_NOTE_LEN)?;
        req.requested_changes.validate()?;

        let mut conn = self.pool().acquire().await?;
        let quote = quotes::find_by_id(&mut conn, req.quote_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(Entity::Quote, req.quote_id))?;
        let invoice = invoices::find_by_id(&mut conn, req.invoice_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(Entity::Invoice, req.invoice_id))?;
        if invoice.quote_id != quote.id {
            return Err(WorkflowError::Validation(format!(
                "Invoice {} does not belong to quote {}",
                invoice.id, quote.id
            )));
        }
        if quote.workflow_status.is_terminal() || invoice.workflow_status == InvoiceStatus::Cancelled {
            return Err(WorkflowError::Validation(format!(
                "Quote {} is {} and can no longer be changed",
                quote.id, quote.workflow_status
            )));
        }

        let decision = evaluate_auto_approval(
            &req.requested_changes,
            &quote,
            Utc::now(),
            &self.settings().approval,
        );

        let cr = change_requests::insert_pending(
            &mut conn,
            &NewChangeRequest {
                invoice_id: invoice.id,
                quote_id: quote.id,
                customer_email: &req.customer_email,
                requested_changes: &req.requested_changes,
                customer_comments: req.customer_comments.as_deref(),
                estimated_cost_change_cents: decision.cost_impact_cents.unwrap_or(0),
            },
        )
        .await?;
        drop(conn);

        tracing::info!(
            change_request_id = cr.id,
            invoice_id = invoice.id,
            auto_approve = decision.auto_approve,
            rule = ?decision.rule,
            "Change request submitted"
        );

        if !decision.auto_approve {
            let warnings = self
                .notifier
                .change_request_needs_review(&cr, &decision.reason)
                .await
                .into_iter()
                .collect();
            return Ok(ChangeRequestOutcome {
                change_request: cr,
                decision: Some(decision),
                invoice: None,
                warnings,
            });
        }

        let approval = ChangeRequestApprove {
            reviewed_by: SYSTEM_REVIEWER.to_string(),
            admin_response: Some(decision.reason.clone()),
            final_cost_change_cents: decision.cost_impact_cents.unwrap_or(0),
        };
        match self.approve_change_request(cr.id, &approval).await {
            Ok(mut outcome) => {
                outcome.decision = Some(decision);
                Ok(outcome)
            }
            Err(e) => {
                // The pending row is committed; leave it for an admin
                tracing::warn!(change_request_id = cr.id, error = %e, "Automatic approval failed, request left pending");
                let mut warnings = vec![DownstreamError::AutoApproval {
                    change_request_id: cr.id,
                    reason: e.to_string(),
                }];
                warnings.extend(
                    self.notifier
                        .change_request_needs_review(&cr, &format!("Automatic approval failed: {e}"))
                        .await,
                );
                Ok(ChangeRequestOutcome {
                    change_request: cr,
                    decision: Some(decision),
                    invoice: None,
                    warnings,
                })
            }
        }
    }

    pub async fn approve_change_request(
        &self,
        change_request_id: i64,
        req: &ChangeRequestApprove,
    ) -> WorkflowResult<ChangeRequestOutcome> {
        validate_required_text(&req.reviewed_by, "reviewed_by", MAX_NAME_LEN)?;
        validate_optional_text(&req.admin_response, "admin_response", MAX_NOTE_LEN)?;

        let mut tx = self.pool().begin().await?;
        let (cr, invoice) = match approve_in(&mut *tx, change_request_id, req).await {
            Ok(done) => done,
            Err(e) => {
                // Dropping the transaction rolls everything back; the request stays pending
                tracing::warn!(change_request_id, error = %e, "Change request approval failed");
                return Err(e);
            }
        };
        tx.commit().await?;

        tracing::info!(
            change_request_id,
            invoice_id = invoice.id,
            reviewed_by = %req.reviewed_by,
            final_cost_change_cents = req.final_cost_change_cents,
            invoice_version = invoice.version,
            "Change request approved"
        );

        let warnings = self
            .notifier
            .change_request_approved(&cr, Some(&invoice))
            .await
            .into_iter()
            .collect();
        Ok(ChangeRequestOutcome {
            change_request: cr,
            decision: None,
            invoice: Some(invoice),
            warnings,
        })
    }

    pub async fn reject_change_request(
        &self,
        change_request_id: i64,
        req: &ChangeRequestReject,
    ) -> WorkflowResult<ChangeRequestOutcome> {
        validate_required_text(&req.reviewed_by, "reviewed_by", MAX_NAME_LEN)?;
        validate_required_text(&req.admin_response, "admin_response", MAX_NOTE_LEN)?;

        let mut conn = self.pool().acquire().await?;
        let cr = load_pending(&mut conn, change_request_id).await?;
        let resolved = change_requests::resolve(
            &mut conn,
            cr.id,
            &Resolution {
                status: ChangeRequestStatus::Rejected,
                reviewed_by: &req.reviewed_by,
                admin_response: Some(&req.admin_response),
                final_cost_change_cents: None,
            },
        )
        .await;
        if let Err(e) = resolved {
            return Err(finalized_or(&mut conn, e, cr.id).await);
        }
        let cr = load_change_request(&mut conn, change_request_id).await?;
        drop(conn);

        tracing::info!(change_request_id, reviewed_by = %req.reviewed_by, "Change request rejected");

        let warnings = self
            .notifier
            .change_request_rejected(&cr)
            .await
            .into_iter()
            .collect();
        Ok(ChangeRequestOutcome {
            change_request: cr,
            decision: None,
            invoice: None,
            warnings,
        })
    }

    pub async fn find_change_request(&self, id: i64) -> WorkflowResult<ChangeRequest> {
        let mut conn = self.pool().acquire().await?;
        load_change_request(&mut conn, id).await
    }

    pub async fn list_change_requests(&self, invoice_id: i64) -> WorkflowResult<Vec<ChangeRequest>> {
        let mut conn = self.pool().acquire().await?;
        Ok(change_requests::find_by_invoice(&mut conn, invoice_id).await?)
    }
}

async fn load_change_request(
    conn: &mut SqliteConnection,
    id: i64,
) -> WorkflowResult<ChangeRequest> {
    change_requests::find_by_id(conn, id)
        .await?
        .ok_or_else(|| WorkflowError::not_found(Entity::ChangeRequest, id))
}

async fn load_pending(conn: &mut SqliteConnection, id: i64) -> WorkflowResult<ChangeRequest> {
    let cr = load_change_request(conn, id).await?;
    if cr.status.is_terminal() {
        return Err(WorkflowError::AlreadyFinalized {
            change_request_id: id,
            status: cr.status.to_string(),
        });
    }
    Ok(cr)
}

/// A zero-row conditional update means someone else finalized the request
async fn finalized_or(conn: &mut SqliteConnection, err: RepoError, id: i64) -> WorkflowError {
    match err {
        RepoError::Conflict(_) => match load_change_request(conn, id).await {
            Ok(cr) => WorkflowError::AlreadyFinalized {
                change_request_id: id,
                status: cr.status.to_string(),
            },
            Err(e) => e,
        },
        other => other.into(),
    }
}

/// All approval writes, on one transaction
async fn approve_in(
    conn: &mut SqliteConnection,
    change_request_id: i64,
    req: &ChangeRequestApprove,
) -> WorkflowResult<(ChangeRequest, Invoice)> {
    let cr = load_pending(conn, change_request_id).await?;
    let quote = quotes::find_by_id(conn, cr.quote_id)
        .await?
        .ok_or_else(|| WorkflowError::not_found(Entity::Quote, cr.quote_id))?;
    let invoice = invoices::find_by_id(conn, cr.invoice_id)
        .await?
        .ok_or_else(|| WorkflowError::not_found(Entity::Invoice, cr.invoice_id))?;

    if quote.workflow_status.is_terminal() {
        return Err(WorkflowError::invalid_transition(
            Entity::Quote,
            quote.workflow_status,
            "changed",
        ));
    }

    let details = apply_changes(&quote, &cr.requested_changes);
    quotes::update_event_details(conn, quote.id, &details)
        .await
        .map_err(|e| match e {
            RepoError::NotFound(_) => WorkflowError::not_found(Entity::Quote, quote.id),
            other => other.into(),
        })?;

    if req.final_cost_change_cents != 0 {
        if invoice.workflow_status == InvoiceStatus::Cancelled {
            return Err(WorkflowError::invalid_transition(
                Entity::Invoice,
                invoice.workflow_status,
                "repriced",
            ));
        }
        line_items::insert(
            conn,
            invoice.id,
            &LineItemInput {
                title: format!("Change request #{}", cr.id),
                description: Some(summarize(&quote, &cr.requested_changes)),
                category: Some("adjustment".to_string()),
                quantity: 1,
                unit_price_cents: req.final_cost_change_cents,
            },
        )
        .await?;
        let subtotal = line_items::subtotal(conn, invoice.id).await?;
        let tax = compute_tax(subtotal, invoice.tax_rate_bps);
        invoices::update_totals(conn, invoice.id, invoice.version, subtotal, tax)
            .await
            .map_err(|e| match e {
                RepoError::Conflict(_) => WorkflowError::OptimisticLockConflict {
                    invoice_id: invoice.id,
                    expected_version: invoice.version,
                },
                other => other.into(),
            })?;

        // Paid / partially paid follow the new total
        let has_payments = milestones::count_by_invoice(conn, invoice.id).await? > 0
            || transactions::sum_completed(conn, invoice.id).await? > 0;
        if has_payments {
            waterfall::apply_in(conn, invoice.id).await?;
        }
    }

    let resolved = change_requests::resolve(
        conn,
        cr.id,
        &Resolution {
            status: ChangeRequestStatus::Approved,
            reviewed_by: &req.reviewed_by,
            admin_response: req.admin_response.as_deref(),
            final_cost_change_cents: Some(req.final_cost_change_cents),
        },
    )
    .await;
    if let Err(e) = resolved {
        return Err(finalized_or(conn, e, cr.id).await);
    }

    let cr = load_change_request(conn, cr.id).await?;
    let invoice = invoices::find_by_id(conn, invoice.id)
        .await?
        .ok_or_else(|| WorkflowError::not_found(Entity::Invoice, invoice.id))?;
    Ok((cr, invoice))
}

/// Quote event details after applying every change in the request
pub fn apply_changes(quote: &Quote, changes: &RequestedChanges) -> QuoteEventDetails {
    let mut details = QuoteEventDetails::from(quote);
    for change in &changes.changes {
        match change {
            Change::GuestCount { new_guest_count } => details.guest_count = *new_guest_count,
            Change::EventDate { new_date } => details.event_date = *new_date,
            Change::EventTime { new_time } => details.event_time = Some(*new_time),
            Change::Location { new_location } => details.location = new_location.trim().to_string(),
            Change::Menu { removed, added } => {
                details.menu_selections.retain(|s| !removed.contains(s));
                for item in added {
                    if !details.menu_selections.contains(item) {
                        details.menu_selections.push(item.clone());
                    }
                }
            }
        }
    }
    details
}

/// One-line description for the adjustment line item
fn summarize(quote: &Quote, changes: &RequestedChanges) -> String {
    changes
        .changes
        .iter()
        .map(|change| match change {
            Change::GuestCount { new_guest_count } => {
                format!("Guest count {} -> {}", quote.guest_count, new_guest_count)
            }
            Change::EventDate { new_date } => format!("Date {} -> {}", quote.event_date, new_date),
            Change::EventTime { new_time } => format!("Time -> {}", new_time.format("%H:%M")),
            Change::Location { new_location } => format!("Location -> {}", new_location.trim()),
            Change::Menu { removed, added } => {
                format!("Menu: {} removed, {} added", removed.len(), added.len())
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}
