//! Workflow error types
//!
//! `WorkflowError` bridges the repository layer (`RepoError`, `sqlx::Error`)
//! and the API layer (`AppError`), so workflow operations can use `?` and
//! handlers still render a typed error code.
//!
//! `DownstreamError` is the one failure that never aborts an operation:
//! outbound email / payment-link failures after a committed mutation are
//! returned next to the result as warnings.

use axum::response::IntoResponse;
use serde::Serialize;
use shared::error::{AppError, ErrorCode};
use thiserror::Error;

use crate::db::RepoError;

/// Entity named in `NotFound` / `InvalidTransition` errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Quote,
    Invoice,
    ChangeRequest,
    LineItem,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Quote => "Quote",
            Self::Invoice => "Invoice",
            Self::ChangeRequest => "Change request",
            Self::LineItem => "Line item",
        })
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: String },

    #[error("Invoice {invoice_id} was modified concurrently (expected version {expected_version})")]
    OptimisticLockConflict {
        invoice_id: i64,
        expected_version: i64,
    },

    #[error("Change request {change_request_id} is already {status}")]
    AlreadyFinalized {
        change_request_id: i64,
        status: String,
    },

    #[error("{entity} cannot move from {from} to {to}")]
    InvalidTransition {
        entity: Entity,
        from: String,
        to: String,
    },

    /// Request-level rejection that carries its own error code
    #[error("{0}")]
    App(AppError),

    #[error("Database error: {0}")]
    Database(String),
}

impl WorkflowError {
    pub fn not_found(entity: Entity, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_transition(
        entity: Entity,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

impl From<RepoError> for WorkflowError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Validation(msg) => WorkflowError::Validation(msg),
            RepoError::Duplicate(msg) => {
                WorkflowError::App(AppError::with_message(ErrorCode::AlreadyExists, msg))
            }
            // Callers that can name the entity map NotFound/Conflict themselves
            RepoError::NotFound(msg) => {
                WorkflowError::App(AppError::with_message(ErrorCode::NotFound, msg))
            }
            RepoError::Conflict(msg) | RepoError::Database(msg) => WorkflowError::Database(msg),
        }
    }
}

impl From<sqlx::Error> for WorkflowError {
    fn from(err: sqlx::Error) -> Self {
        RepoError::from(err).into()
    }
}

impl From<AppError> for WorkflowError {
    fn from(err: AppError) -> Self {
        match err.code {
            ErrorCode::ValidationFailed => WorkflowError::Validation(err.message),
            _ => WorkflowError::App(err),
        }
    }
}

impl From<WorkflowError> for AppError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Validation(msg) => AppError::validation(msg),
            WorkflowError::NotFound { entity, id } => {
                let code = match entity {
                    Entity::Quote => ErrorCode::QuoteNotFound,
                    Entity::Invoice => ErrorCode::InvoiceNotFound,
                    Entity::ChangeRequest => ErrorCode::ChangeRequestNotFound,
                    Entity::LineItem => ErrorCode::LineItemNotFound,
                };
                AppError::with_message(code, format!("{entity} {id} not found"))
                    .with_detail("id", id)
            }
            WorkflowError::OptimisticLockConflict {
                invoice_id,
                expected_version,
            } => AppError::version_conflict(invoice_id, expected_version),
            WorkflowError::AlreadyFinalized {
                change_request_id,
                status,
            } => AppError::already_finalized(change_request_id, status),
            WorkflowError::InvalidTransition { entity, from, to } => {
                let code = match entity {
                    Entity::Quote => ErrorCode::QuoteStatusInvalid,
                    _ => ErrorCode::InvoiceStatusInvalid,
                };
                AppError::with_message(code, format!("{entity} cannot move from {from} to {to}"))
                    .with_detail("from", from)
                    .with_detail("to", to)
            }
            WorkflowError::App(app) => app,
            WorkflowError::Database(msg) => {
                tracing::error!(error = %msg, "Workflow database error");
                AppError::new(ErrorCode::DatabaseError)
            }
        }
    }
}

impl IntoResponse for WorkflowError {
    fn into_response(self) -> axum::response::Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Failure of an outbound collaborator after the primary mutation succeeded
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DownstreamError {
    #[error("Failed to send email to {to}: {reason}")]
    Notification { to: String, reason: String },

    #[error("Failed to create payment link: {reason}")]
    PaymentLink { reason: String },

    #[error("Automatic approval of change request {change_request_id} failed: {reason}")]
    AutoApproval {
        change_request_id: i64,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[test]
    fn test_lock_conflict_maps_to_409() {
        let app: AppError = WorkflowError::OptimisticLockConflict {
            invoice_id: 7,
            expected_version: 3,
        }
        .into();
        assert_eq!(app.code, ErrorCode::InvoiceVersionConflict);
        assert_eq!(app.http_status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_not_found_uses_entity_code() {
        let app: AppError = WorkflowError::not_found(Entity::ChangeRequest, 42).into();
        assert_eq!(app.code, ErrorCode::ChangeRequestNotFound);
        assert_eq!(app.message, "Change request 42 not found");
    }

    #[test]
    fn test_already_finalized_message() {
        let err = WorkflowError::AlreadyFinalized {
            change_request_id: 5,
            status: "approved".into(),
        };
        assert_eq!(err.to_string(), "Change request 5 is already approved");
        let app: AppError = err.into();
        assert_eq!(app.code, ErrorCode::ChangeRequestFinalized);
    }

    #[test]
    fn test_validation_app_error_becomes_validation_variant() {
        let err: WorkflowError = AppError::validation("bad guest count").into();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn test_database_error_hides_detail() {
        let app: AppError = WorkflowError::Database("disk I/O error".into()).into();
        assert_eq!(app.code, ErrorCode::DatabaseError);
        assert!(!app.message.contains("disk"));
    }
}
