// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! API error type and the mapping from domain errors to HTTP responses.
//!
//! | Source | Status | `error_code` |
//! |---|---|---|
//! | field validation, uniqueness | 400 | `validation_error` |
//! | authentication | 401 | see [`AuthError::error_code`] |
//! | ownership / staff checks | 403 | `permission_denied` |
//! | missing record | 404 | `not_found` |
//! | delete blocked by references | 409 | `protected` |
//! | ledger rule violations | 422 | one code per rule |
//! | storage failures | 500 | `internal_error` |

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::AuthError;
use crate::ledger::LedgerError;
use crate::models::FieldErrors;
use crate::storage::{DbError, StorageError};

/// Message returned for every 5xx response.
const INTERNAL_MESSAGE: &str = "An internal error occurred";

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub fields: Option<FieldErrors>,
}

/// JSON body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Human-readable message
    pub error: String,
    /// Stable machine-readable code
    pub error_code: String,
    /// Field name to messages, for validation failures
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub fields: Option<FieldErrors>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            fields: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "permission_denied", message)
    }

    pub fn unprocessable(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, code, message)
    }

    /// 400 with per-field detail.
    pub fn validation(fields: FieldErrors) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "validation_error",
            message: "Invalid input".to_string(),
            fields: Some(fields),
        }
    }

    /// 400 for a single field.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::validation(FieldErrors::single(field, message))
    }

    /// 500 with a generic message; `detail` goes to the log only.
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        tracing::error!(error = %detail, "Request failed with an internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", INTERNAL_MESSAGE)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_client_error() {
            tracing::debug!(status = %self.status, code = self.code, error = %self.message, "Request rejected");
        }
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.code.to_string(),
            fields: self.fields,
        });
        (self.status, body).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { resource, id } => {
                ApiError::not_found(format!("{resource} {id} not found"))
            }
            StorageError::Validation(fields) => ApiError::validation(fields),
            StorageError::Protected { resource, reason } => ApiError::new(
                StatusCode::CONFLICT,
                "protected",
                format!("This {resource} cannot be deleted: {reason}"),
            ),
            StorageError::Database(e) => ApiError::internal(e),
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        ApiError::internal(err)
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let message = err.to_string();
        match err {
            LedgerError::Store(e) => e.into(),
            LedgerError::Validation(fields) => ApiError::validation(fields),
            LedgerError::StaffOnly => ApiError::forbidden(message),
            LedgerError::InsufficientCredits { .. } => {
                ApiError::unprocessable("insufficient_credits", message)
            }
            LedgerError::AllowanceExhausted(_) => ApiError::unprocessable("allowance_exhausted", message),
            LedgerError::NotRedeemable(_) => ApiError::unprocessable("listing_not_redeemable", message),
            LedgerError::ListingUnavailable { .. } => {
                ApiError::unprocessable("listing_unavailable", message)
            }
            LedgerError::SubscriptionInactive(_) => {
                ApiError::unprocessable("subscription_inactive", message)
            }
            LedgerError::InvalidTransition { .. } => ApiError::unprocessable("invalid_transition", message),
            LedgerError::CertificateInvalidated(_) => {
                ApiError::unprocessable("certificate_invalidated", message)
            }
            LedgerError::NotRefundable { .. } => ApiError::unprocessable("not_refundable", message),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        if let AuthError::InternalError(detail) = &err {
            return ApiError::internal(detail);
        }
        ApiError::new(err.status_code(), err.error_code(), err.to_string())
    }
}

impl From<FieldErrors> for ApiError {
    fn from(fields: FieldErrors) -> Self {
        ApiError::validation(fields)
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut fields = FieldErrors::default();
        for (field, errors) in err.field_errors() {
            for error in errors {
                let message = match &error.message {
                    Some(message) => message.to_string(),
                    None => format!("Invalid value ({}).", error.code),
                };
                fields.add(field.to_string(), message);
            }
        }
        ApiError::validation(fields)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(rejection.status(), "bad_request", rejection.body_text())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
