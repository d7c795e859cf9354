//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            // Success
            Self::Success => StatusCode::OK,

            // 404 Not Found
            Self::NotFound
            | Self::QuoteNotFound
            | Self::InvoiceNotFound
            | Self::LineItemNotFound
            | Self::ChangeRequestNotFound => StatusCode::NOT_FOUND,

            // 409 Conflict
            Self::AlreadyExists
            | Self::InvoiceVersionConflict
            | Self::ChangeRequestFinalized
            | Self::MilestonesAlreadyGenerated => StatusCode::CONFLICT,

            // 422 Unprocessable (business state does not allow the action)
            Self::QuoteStatusInvalid
            | Self::QuoteCancelled
            | Self::InvoiceStatusInvalid
            | Self::InvoiceNotDraft
            | Self::NothingOutstanding => StatusCode::UNPROCESSABLE_ENTITY,

            // 401 Unauthorized
            Self::InvoiceTokenInvalid | Self::WebhookSignatureInvalid => {
                StatusCode::UNAUTHORIZED
            }

            // 502 Bad Gateway (payment provider / mail provider)
            Self::PaymentFailed | Self::PaymentLinkFailed | Self::NotificationFailed => {
                StatusCode::BAD_GATEWAY
            }

            // 503 Service Unavailable (transient errors, client can retry)
            Self::NetworkError | Self::TimeoutError => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            Self::Unknown | Self::InternalError | Self::DatabaseError | Self::ConfigError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            // 400 Bad Request (default for validation errors)
            Self::ValidationFailed
            | Self::InvalidRequest
            | Self::InvalidFormat
            | Self::RequiredField
            | Self::ValueOutOfRange
            | Self::PaymentInvalidAmount
            | Self::ChangeRequestEmpty => StatusCode::BAD_REQUEST,
        }
    }
}
