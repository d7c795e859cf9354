//! Quote Model (customer event request)

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Quote workflow status
///
/// `pending → under_review → quoted/estimated → confirmed → completed`,
/// with `cancelled` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum QuoteStatus {
    Pending,
    UnderReview,
    Quoted,
    Estimated,
    Confirmed,
    Completed,
    Cancelled,
}

impl QuoteStatus {
    /// Position along the forward workflow. `quoted` and `estimated` share a rank.
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::UnderReview => 1,
            Self::Quoted | Self::Estimated => 2,
            Self::Confirmed => 3,
            Self::Completed => 4,
            Self::Cancelled => 5,
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether `self` is at or beyond `other` on the forward path.
    /// A cancelled quote is never "at least" anything.
    pub fn is_at_least(&self, other: QuoteStatus) -> bool {
        !matches!(self, Self::Cancelled) && self.rank() >= other.rank()
    }

    /// Forward-only transitions, plus cancellation from any non-terminal state.
    pub fn can_transition_to(&self, next: QuoteStatus) -> bool {
        if self.is_terminal() || *self == next {
            return false;
        }
        match next {
            Self::Cancelled => true,
            Self::Estimated if *self == Self::Quoted => true,
            _ => next.rank() > self.rank(),
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::UnderReview => "under_review",
            Self::Quoted => "quoted",
            Self::Estimated => "estimated",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Customer classification, drives the payment schedule shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum CustomerType {
    #[default]
    Standard,
    /// Government / PO-based customer, always invoiced Net-30 after the event
    Government,
}

/// One selected menu item
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MenuSelection {
    /// Menu category (appetizers, mains, desserts, ...)
    pub category: String,
    pub item: String,
}

impl MenuSelection {
    pub fn new(category: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            item: item.into(),
        }
    }
}

/// Quote record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Quote {
    pub id: i64,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub customer_type: CustomerType,
    pub event_date: NaiveDate,
    pub event_time: Option<NaiveTime>,
    pub location: String,
    pub guest_count: i32,
    /// Service style (buffet, plated, drop-off, ...)
    pub service_type: String,
    #[cfg_attr(feature = "db", sqlx(json))]
    pub menu_selections: Vec<MenuSelection>,
    pub workflow_status: QuoteStatus,
    /// Actor of the last status change ("system_sync", admin name, ...)
    pub status_changed_by: Option<String>,
    pub status_changed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Create quote payload (customer intake)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteCreate {
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub customer_type: CustomerType,
    pub event_date: NaiveDate,
    pub event_time: Option<NaiveTime>,
    pub location: String,
    pub guest_count: i32,
    pub service_type: String,
    #[serde(default)]
    pub menu_selections: Vec<MenuSelection>,
}

/// Admin status change payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteStatusUpdate {
    pub status: QuoteStatus,
    pub changed_by: String,
}
