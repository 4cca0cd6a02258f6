// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use crate::models::FieldErrors;
use crate::storage::{DbError, StorageError};

/// Errors raised by ledger operations.
///
/// Every variant aborts the enclosing write transaction, so a failed
/// operation leaves balances, allowances and ledger rows untouched.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient green credits: {required} required, {available} available")]
    InsufficientCredits { required: i64, available: i64 },

    #[error("subscription {0} has no wipes left")]
    AllowanceExhausted(String),

    #[error("listing {0} cannot be redeemed with green credits")]
    NotRedeemable(String),

    #[error("listing {listing_id} is not available: {reason}")]
    ListingUnavailable {
        listing_id: String,
        reason: &'static str,
    },

    #[error("subscription {0} is not active")]
    SubscriptionInactive(String),

    #[error("cannot change status from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("certificate {0} has been invalidated")]
    CertificateInvalidated(String),

    #[error("transaction {id} cannot be refunded: {reason}")]
    NotRefundable { id: String, reason: &'static str },

    #[error("only staff may perform this change")]
    StaffOnly,

    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    #[error(transparent)]
    Store(#[from] StorageError),
}

impl LedgerError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::Validation(FieldErrors::single(field, message))
    }

    pub(crate) fn transition(from: impl std::fmt::Debug, to: impl std::fmt::Debug) -> Self {
        Self::InvalidTransition {
            from: format!("{from:?}").to_lowercase(),
            to: format!("{to:?}").to_lowercase(),
        }
    }
}

impl From<DbError> for LedgerError {
    fn from(err: DbError) -> Self {
        Self::Store(StorageError::Database(err))
    }
}

impl From<FieldErrors> for LedgerError {
    fn from(errors: FieldErrors) -> Self {
        Self::Validation(errors)
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
