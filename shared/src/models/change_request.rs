//! Change Request Model
//!
//! A proposed modification against an already priced quote/invoice. The
//! payload is a list of typed [`Change`]s, one per change category.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::quote::MenuSelection;
use crate::error::{AppError, ErrorCode};

/// Change request status. `approved` and `rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum ChangeRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl ChangeRequestStatus {
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ChangeRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single requested modification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Change {
    GuestCount {
        new_guest_count: i32,
    },
    Menu {
        #[serde(default)]
        removed: Vec<MenuSelection>,
        #[serde(default)]
        added: Vec<MenuSelection>,
    },
    EventDate {
        new_date: NaiveDate,
    },
    EventTime {
        new_time: NaiveTime,
    },
    Location {
        new_location: String,
    },
}

/// Change category, one per [`Change`] variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    GuestCount,
    Menu,
    EventDate,
    EventTime,
    Location,
}

impl Change {
    pub const fn kind(&self) -> ChangeKind {
        match self {
            Self::GuestCount { .. } => ChangeKind::GuestCount,
            Self::Menu { .. } => ChangeKind::Menu,
            Self::EventDate { .. } => ChangeKind::EventDate,
            Self::EventTime { .. } => ChangeKind::EventTime,
            Self::Location { .. } => ChangeKind::Location,
        }
    }
}

/// Structured diff carried by a change request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedChanges {
    pub changes: Vec<Change>,
}

impl RequestedChanges {
    pub fn new(changes: Vec<Change>) -> Self {
        Self { changes }
    }

    pub fn kinds(&self) -> HashSet<ChangeKind> {
        self.changes.iter().map(Change::kind).collect()
    }

    pub fn find(&self, kind: ChangeKind) -> Option<&Change> {
        self.changes.iter().find(|c| c.kind() == kind)
    }

    /// Category stored on the change request row
    pub fn request_type(&self) -> RequestType {
        match self.changes.as_slice() {
            [single] => match single.kind() {
                ChangeKind::GuestCount => RequestType::GuestCount,
                ChangeKind::Menu => RequestType::Menu,
                ChangeKind::EventDate => RequestType::EventDate,
                ChangeKind::EventTime => RequestType::EventTime,
                ChangeKind::Location => RequestType::Location,
            },
            _ => RequestType::Multiple,
        }
    }

    /// Reject empty, duplicated or out-of-range changes before anything is stored
    pub fn validate(&self) -> Result<(), AppError> {
        if self.changes.is_empty() {
            return Err(AppError::new(ErrorCode::ChangeRequestEmpty));
        }
        if self.kinds().len() != self.changes.len() {
            return Err(AppError::validation(
                "Each change type may appear at most once per request",
            ));
        }
        for change in &self.changes {
            match change {
                Change::GuestCount { new_guest_count } if *new_guest_count <= 0 => {
                    return Err(AppError::validation(format!(
                        "Guest count must be positive, got {new_guest_count}"
                    ))
                    .with_detail("field", "new_guest_count"));
                }
                Change::Menu { removed, added } if removed.is_empty() && added.is_empty() => {
                    return Err(AppError::validation("Menu change lists no items")
                        .with_detail("field", "menu"));
                }
                Change::Location { new_location } if new_location.trim().is_empty() => {
                    return Err(AppError::validation("Location must not be empty")
                        .with_detail("field", "new_location"));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Stored request category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum RequestType {
    GuestCount,
    Menu,
    EventDate,
    EventTime,
    Location,
    Multiple,
}

/// Change request record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct ChangeRequest {
    pub id: i64,
    pub invoice_id: i64,
    pub quote_id: i64,
    pub customer_email: String,
    pub request_type: RequestType,
    #[cfg_attr(feature = "db", sqlx(json))]
    pub requested_changes: RequestedChanges,
    pub customer_comments: Option<String>,
    pub status: ChangeRequestStatus,
    pub admin_response: Option<String>,
    /// Rule-engine estimate at submission time
    pub estimated_cost_change_cents: Option<i64>,
    /// Amount actually applied on approval
    pub final_cost_change_cents: Option<i64>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Submit payload (customer portal or admin manual entry)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRequestSubmit {
    pub quote_id: i64,
    pub invoice_id: i64,
    pub customer_email: String,
    pub requested_changes: RequestedChanges,
    pub customer_comments: Option<String>,
}

/// Admin approval payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRequestApprove {
    pub reviewed_by: String,
    pub admin_response: Option<String>,
    /// Signed amount added to the invoice subtotal (0 = no price change)
    #[serde(default)]
    pub final_cost_change_cents: i64,
}

/// Admin rejection payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRequestReject {
    pub reviewed_by: String,
    pub admin_response: String,
}
