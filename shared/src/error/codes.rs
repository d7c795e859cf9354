//! Unified error codes for the catering workflow
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Quote errors
//! - 2xxx: Invoice / estimate errors
//! - 3xxx: Payment errors
//! - 4xxx: Change request errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility (Rust, TypeScript, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Invalid format
    InvalidFormat = 6,
    /// Required field missing
    RequiredField = 7,
    /// Value out of range
    ValueOutOfRange = 8,

    // ==================== 1xxx: Quote ====================
    /// Quote not found
    QuoteNotFound = 1001,
    /// Quote status transition not allowed
    QuoteStatusInvalid = 1002,
    /// Quote has been cancelled
    QuoteCancelled = 1003,

    // ==================== 2xxx: Invoice ====================
    /// Invoice not found
    InvoiceNotFound = 2001,
    /// Invoice was modified concurrently (version mismatch)
    InvoiceVersionConflict = 2002,
    /// Invoice status transition not allowed
    InvoiceStatusInvalid = 2003,
    /// Invoice is no longer a draft
    InvoiceNotDraft = 2004,
    /// Portal access token is invalid
    InvoiceTokenInvalid = 2005,
    /// Line item not found
    LineItemNotFound = 2006,

    // ==================== 3xxx: Payment ====================
    /// Payment processing failed
    PaymentFailed = 3001,
    /// Payment amount is invalid
    PaymentInvalidAmount = 3002,
    /// Payment link could not be created
    PaymentLinkFailed = 3003,
    /// Payment milestones already exist for the invoice
    MilestonesAlreadyGenerated = 3004,
    /// Webhook signature verification failed
    WebhookSignatureInvalid = 3005,
    /// Nothing left to collect on the invoice
    NothingOutstanding = 3006,

    // ==================== 4xxx: Change Request ====================
    /// Change request not found
    ChangeRequestNotFound = 4001,
    /// Change request already approved or rejected
    ChangeRequestFinalized = 4002,
    /// Change request contains no changes
    ChangeRequestEmpty = 4003,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Network error
    NetworkError = 9003,
    /// Operation timeout
    TimeoutError = 9004,
    /// Configuration error
    ConfigError = 9005,
    /// Notification could not be delivered
    NotificationFailed = 9006,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::RequiredField => "Required field is missing",
            ErrorCode::ValueOutOfRange => "Value is out of range",

            // Quote
            ErrorCode::QuoteNotFound => "Quote not found",
            ErrorCode::QuoteStatusInvalid => "Quote status transition is not allowed",
            ErrorCode::QuoteCancelled => "Quote has been cancelled",

            // Invoice
            ErrorCode::InvoiceNotFound => "Invoice not found",
            ErrorCode::InvoiceVersionConflict => {
                "Invoice was updated by someone else, please reload and retry"
            }
            ErrorCode::InvoiceStatusInvalid => "Invoice status transition is not allowed",
            ErrorCode::InvoiceNotDraft => "Invoice is no longer a draft",
            ErrorCode::InvoiceTokenInvalid => "Invalid or expired invoice link",
            ErrorCode::LineItemNotFound => "Line item not found",

            // Payment
            ErrorCode::PaymentFailed => "Payment processing failed",
            ErrorCode::PaymentInvalidAmount => "Invalid payment amount",
            ErrorCode::PaymentLinkFailed => "Payment link could not be created",
            ErrorCode::MilestonesAlreadyGenerated => "Payment schedule already exists",
            ErrorCode::WebhookSignatureInvalid => "Webhook signature verification failed",
            ErrorCode::NothingOutstanding => "Invoice has no outstanding balance",

            // Change request
            ErrorCode::ChangeRequestNotFound => "Change request not found",
            ErrorCode::ChangeRequestFinalized => "Change request has already been finalized",
            ErrorCode::ChangeRequestEmpty => "Change request contains no changes",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::NetworkError => "Network error",
            ErrorCode::TimeoutError => "Operation timed out",
            ErrorCode::ConfigError => "Configuration error",
            ErrorCode::NotificationFailed => "Notification could not be delivered",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),
            5 => Ok(ErrorCode::InvalidRequest),
            6 => Ok(ErrorCode::InvalidFormat),
            7 => Ok(ErrorCode::RequiredField),
            8 => Ok(ErrorCode::ValueOutOfRange),

            // Quote
            1001 => Ok(ErrorCode::QuoteNotFound),
            1002 => Ok(ErrorCode::QuoteStatusInvalid),
            1003 => Ok(ErrorCode::QuoteCancelled),

            // Invoice
            2001 => Ok(ErrorCode::InvoiceNotFound),
            2002 => Ok(ErrorCode::InvoiceVersionConflict),
            2003 => Ok(ErrorCode::InvoiceStatusInvalid),
            2004 => Ok(ErrorCode::InvoiceNotDraft),
            2005 => Ok(ErrorCode::InvoiceTokenInvalid),
            2006 => Ok(ErrorCode::LineItemNotFound),

            // Payment
            3001 => Ok(ErrorCode::PaymentFailed),
            3002 => Ok(ErrorCode::PaymentInvalidAmount),
            3003 => Ok(ErrorCode::PaymentLinkFailed),
            3004 => Ok(ErrorCode::MilestonesAlreadyGenerated),
            3005 => Ok(ErrorCode::WebhookSignatureInvalid),
            3006 => Ok(ErrorCode::NothingOutstanding),

            // Change request
            4001 => Ok(ErrorCode::ChangeRequestNotFound),
            4002 => Ok(ErrorCode::ChangeRequestFinalized),
            4003 => Ok(ErrorCode::ChangeRequestEmpty),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9003 => Ok(ErrorCode::NetworkError),
            9004 => Ok(ErrorCode::TimeoutError),
            9005 => Ok(ErrorCode::ConfigError),
            9006 => Ok(ErrorCode::NotificationFailed),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:04}", self.code())
    }
}
