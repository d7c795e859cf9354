//! Payment milestone & transaction models

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Milestone kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum MilestoneType {
    /// Small up-front payment on long lead bookings
    Deposit,
    /// Larger up-front payment on medium lead bookings
    Combined,
    /// Whole amount up front (rush bookings)
    Full,
    Milestone,
    Balance,
    Final,
    /// Net-30 after the event (government / PO customers)
    Net30,
}

impl MilestoneType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Combined => "combined",
            Self::Full => "full",
            Self::Milestone => "milestone",
            Self::Balance => "balance",
            Self::Final => "final",
            Self::Net30 => "net30",
        }
    }
}

impl fmt::Display for MilestoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Milestone status, derived from completed payments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum MilestoneStatus {
    Pending,
    Partial,
    Paid,
}

impl fmt::Display for MilestoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Partial => "partial",
            Self::Paid => "paid",
        })
    }
}

/// Payment milestone record
///
/// Structure is fixed once generated; only `status` changes afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct PaymentMilestone {
    pub id: i64,
    pub invoice_id: i64,
    pub milestone_type: MilestoneType,
    pub description: String,
    /// Share of the invoice total in basis points (4000 = 40%)
    pub percentage_bps: i64,
    pub amount_cents: i64,
    /// `None` means due now
    pub due_date: Option<NaiveDate>,
    pub status: MilestoneStatus,
    pub sort_order: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

/// Payment ledger entry (append-only)
///
/// The sum of `completed` rows is the authoritative paid amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct PaymentTransaction {
    pub id: i64,
    pub invoice_id: i64,
    pub amount_cents: i64,
    pub status: TransactionStatus,
    /// Gateway session / reference, unique per attempt
    pub gateway_ref: String,
    /// "stripe", "check", "cash", ...
    pub method: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Record a captured payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInput {
    pub amount_cents: i64,
    /// Idempotency key; duplicate deliveries with the same reference are ignored
    pub gateway_ref: String,
    #[serde(default = "default_method")]
    pub method: String,
}

fn default_method() -> String {
    "manual".to_string()
}
