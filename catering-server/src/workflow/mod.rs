//! Quote-to-invoice workflow core
//!
//! - [`schedule`]: payment milestone scheduler
//! - [`waterfall`]: allocates completed payments across milestones
//! - [`approval`]: auto-approval rule engine for change requests
//! - [`change_request`]: change request lifecycle
//! - [`sync`]: quote / invoice status reconciliation
//! - [`invoice`], [`quote`]: lifecycle operations around the records
//!
//! The pure pieces (scheduler, allocation, rule engine) take `now` as an
//! argument. [`WorkflowService`] wires them to the database and the outbound
//! collaborators.

pub mod approval;
pub mod change_request;
pub mod invoice;
pub mod quote;
pub mod schedule;
pub mod sync;
pub mod waterfall;

use std::sync::Arc;

use sqlx::SqlitePool;

pub use approval::{ApprovalDecision, ApprovalPolicy, ApprovalRule, evaluate_auto_approval};
pub use schedule::{DueMarker, PaymentRule, ScheduledMilestone, SchedulePolicy, generate_schedule};
pub use change_request::{ChangeRequestOutcome, SYSTEM_REVIEWER, apply_changes};
pub use invoice::{CheckoutOutcome, CustomerApproval, InvoiceDetail, InvoiceOutcome};
pub use sync::{SYNC_MARKER, SyncOutcome, required_quote_status};
pub use waterfall::{PaymentOutcome, WaterfallOutcome, allocate, derive_invoice_status, next_outstanding};

use crate::email::Notifier;
use crate::error::DownstreamError;
use crate::stripe::PaymentLinks;

/// Business parameters injected into the workflow
#[derive(Debug, Clone, Default)]
pub struct WorkflowSettings {
    pub schedule: SchedulePolicy,
    pub approval: ApprovalPolicy,
}

/// Database-backed workflow operations
#[derive(Clone)]
pub struct WorkflowService {
    pool: SqlitePool,
    notifier: Notifier,
    payments: Arc<dyn PaymentLinks>,
    settings: WorkflowSettings,
}

impl WorkflowService {
    pub fn new(
        pool: SqlitePool,
        notifier: Notifier,
        payments: Arc<dyn PaymentLinks>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            pool,
            notifier,
            payments,
            settings,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }
}

/// Warnings collected next to a successful primary result
pub type Warnings = Vec<DownstreamError>;
