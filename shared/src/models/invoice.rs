//! Invoice / Estimate Model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Invoice workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Viewed,
    Approved,
    PaymentPending,
    PartiallyPaid,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled)
    }

    /// Customer has accepted the document (approved or anything after it)
    pub const fn is_accepted(&self) -> bool {
        matches!(
            self,
            Self::Approved | Self::PaymentPending | Self::PartiallyPaid | Self::Paid | Self::Overdue
        )
    }

    /// Lifecycle transitions driven by explicit actions (send, view,
    /// approve, checkout, overdue sweep, cancel). Payment-derived statuses
    /// (`partially_paid`, `paid`) are set by the waterfall and bypass this table.
    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, next),
            (Draft, Sent)
                | (Sent, Viewed)
                | (Sent | Viewed, Approved)
                | (Approved, PaymentPending)
                | (Approved | PaymentPending | PartiallyPaid, Overdue)
                | (Draft | Sent | Viewed | Approved | PaymentPending | Overdue, Cancelled)
        )
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Viewed => "viewed",
            Self::Approved => "approved",
            Self::PaymentPending => "payment_pending",
            Self::PartiallyPaid => "partially_paid",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum DocumentType {
    #[default]
    Estimate,
    Invoice,
}

/// Invoice record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Invoice {
    pub id: i64,
    /// Back-reference to the quote this document prices
    pub quote_id: i64,
    pub document_type: DocumentType,
    pub subtotal_cents: i64,
    /// Tax rate in basis points (825 = 8.25%)
    pub tax_rate_bps: i64,
    pub tax_amount_cents: i64,
    /// Always `subtotal_cents + tax_amount_cents`
    pub total_cents: i64,
    pub workflow_status: InvoiceStatus,
    pub is_draft: bool,
    /// Token for unauthenticated customer portal access
    pub access_token: String,
    /// Optimistic concurrency counter, bumped on every write
    pub version: i64,
    pub sent_at: Option<i64>,
    pub viewed_at: Option<i64>,
    pub approved_at: Option<i64>,
    pub paid_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Invoice {
    /// Tax for a subtotal at this invoice's rate (half-up rounding to the cent)
    pub fn tax_for(&self, subtotal_cents: i64) -> i64 {
        compute_tax(subtotal_cents, self.tax_rate_bps)
    }
}

/// `subtotal * rate_bps / 10000`, rounded half away from zero
pub fn compute_tax(subtotal_cents: i64, tax_rate_bps: i64) -> i64 {
    let raw = subtotal_cents as i128 * tax_rate_bps as i128;
    let rounded = if raw >= 0 {
        (raw + 5_000) / 10_000
    } else {
        (raw - 5_000) / 10_000
    };
    rounded as i64
}

/// Line item record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct LineItem {
    pub id: i64,
    pub invoice_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub total_price_cents: i64,
    pub sort_order: i32,
    pub created_at: i64,
}

/// Line item payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItemInput {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

impl LineItemInput {
    pub fn total_price_cents(&self) -> i64 {
        self.quantity as i64 * self.unit_price_cents
    }
}

/// Create estimate payload (admin pricing action)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceCreate {
    pub quote_id: i64,
    #[serde(default)]
    pub document_type: DocumentType,
    #[serde(default)]
    pub tax_rate_bps: i64,
    #[serde(default)]
    pub line_items: Vec<LineItemInput>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        assert!(InvoiceStatus::Draft.can_transition_to(InvoiceStatus::Sent));
        assert!(InvoiceStatus::Sent.can_transition_to(InvoiceStatus::Viewed));
        assert!(InvoiceStatus::Viewed.can_transition_to(InvoiceStatus::Approved));
        assert!(InvoiceStatus::Sent.can_transition_to(InvoiceStatus::Approved));
        assert!(InvoiceStatus::Approved.can_transition_to(InvoiceStatus::PaymentPending));
        assert!(InvoiceStatus::PartiallyPaid.can_transition_to(InvoiceStatus::Overdue));
    }

    #[test]
    fn test_rejected_transitions() {
        assert!(!InvoiceStatus::Draft.can_transition_to(InvoiceStatus::Approved));
        assert!(!InvoiceStatus::Paid.can_transition_to(InvoiceStatus::Cancelled));
        assert!(!InvoiceStatus::Cancelled.can_transition_to(InvoiceStatus::Sent));
        assert!(!InvoiceStatus::Viewed.can_transition_to(InvoiceStatus::Sent));
        assert!(!InvoiceStatus::PartiallyPaid.can_transition_to(InvoiceStatus::Cancelled));
    }

    #[test]
    fn test_compute_tax_rounding() {
        assert_eq!(compute_tax(10_000, 825), 825);
        // 1234 * 0.0825 = 101.805 -> 102
        assert_eq!(compute_tax(1_234, 825), 102);
        // 1000 * 0.0825 = 82.5 -> 83 (half up)
        assert_eq!(compute_tax(1_000, 825), 83);
        assert_eq!(compute_tax(-1_000, 825), -83);
        assert_eq!(compute_tax(50_000, 0), 0);
    }

    #[test]
    fn test_line_item_total() {
        let input = LineItemInput {
            title: "Plated dinner".into(),
            description: None,
            category: Some("mains".into()),
            quantity: 120,
            unit_price_cents: 4_500,
        };
        assert_eq!(input.total_price_cents(), 540_000);
    }
}
