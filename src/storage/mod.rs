// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent state lives in a single redb database under `DATA_DIR`; audit
//! events are appended as JSONL files next to it.
//!
//! ## Storage Layout
//!
//! ```text
//! $DATA_DIR/
//!   cleanslate.redb           # All entities + unique index
//!   audit/
//!     {date}/events.jsonl     # Daily audit logs
//! ```
//!
//! Repositories in [`repository`] give typed access to each entity table and
//! enforce uniqueness and referential constraints inside the caller's
//! transaction. Multi-row business operations (balances, allowances) belong
//! to the ledger, which composes repositories within one [`Store::write`].

use crate::models::FieldErrors;

pub mod audit;
pub mod database;
pub mod ownership;
pub mod paths;
pub mod repository;

pub use audit::{AuditEvent, AuditEventType, AuditRepository};
pub use database::{DbError, ReadTables, Reader, Record, Store, Writer};
pub use ownership::{OwnedResource, OwnershipEnforcer};
pub use paths::StoragePaths;
pub use repository::{
    AdminActionRepository, CategoryRepository, CertificateRepository, CreditRepository,
    ListingFilter, ListingRepository, MediaRepository, PackageRepository,
    SubscriptionRepository, UserRepository,
};

/// Errors raised by repositories.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: String },

    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    #[error("{resource} cannot be removed: {reason}")]
    Protected {
        resource: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Database(#[from] DbError),
}

impl StorageError {
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            id: id.into(),
        }
    }

    /// Validation failure on a single field.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::Validation(FieldErrors::single(field, message))
    }
}

impl From<FieldErrors> for StorageError {
    fn from(errors: FieldErrors) -> Self {
        Self::Validation(errors)
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
