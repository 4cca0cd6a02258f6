// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the entity tables.
//!
//! Each repository wraps a transaction handle. Reads work inside any
//! transaction (`S: ReadTables`); writes are only available on a
//! [`Writer`], so they always run inside a [`super::Store::write`] closure
//! and roll back together with the rest of the caller's work.

use super::database::{ReadTables, Record, Writer};
use super::{StorageError, StorageResult};
use crate::models::FieldErrors;

pub mod admin_actions;
pub mod categories;
pub mod certificates;
pub mod credits;
pub mod listings;
pub mod media;
pub mod packages;
pub mod subscriptions;
pub mod users;

pub use admin_actions::{AdminActionRepository, StoredAdminAction};
pub use categories::{CategoryRepository, StoredCategory};
pub use certificates::{
    CertificateRepository, CertificateStatus, DeviceType, OperatingSystem, StoredCertificate,
    WipingMethod,
};
pub use credits::{CreditRepository, StoredCreditTransaction, TransactionType};
pub use listings::{
    ListingCondition, ListingFilter, ListingRepository, ListingStatus, StoredListing,
};
pub use media::{MediaRepository, MediaType, StoredListingMedia};
pub use packages::{PackageRepository, StoredPackage};
pub use subscriptions::{StoredSubscription, SubscriptionRepository, SubscriptionStatus};
pub use users::{normalize_email, StoredUser, UserRepository};

/// Generate a new record id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Load a record or fail with `NotFound`.
pub(crate) fn require<T: Record, S: ReadTables>(tx: &S, id: &str) -> StorageResult<T> {
    tx.get::<T>(id)?
        .ok_or_else(|| StorageError::not_found(T::KIND, id))
}

/// Check that an optional foreign key points at an existing record.
pub(crate) fn check_reference<T: Record, S: ReadTables>(
    tx: &S,
    errors: &mut FieldErrors,
    field: &str,
    id: Option<&str>,
) -> StorageResult<()> {
    if let Some(id) = id {
        if tx.get::<T>(id)?.is_none() {
            errors.add(field, format!("Invalid pk \"{id}\" - object does not exist."));
        }
    }
    Ok(())
}

/// One unique column of a record being written.
pub(crate) struct UniqueField<'v> {
    pub field: &'static str,
    /// Value currently stored (None for inserts or null columns)
    pub old: Option<&'v str>,
    /// Value being written
    pub new: Option<&'v str>,
}

/// Reserve every changed unique value for `id` and release the values it no
/// longer holds.
///
/// All conflicts are reported together; on conflict nothing is released and
/// the caller's transaction is expected to abort.
pub(crate) fn claim_unique_fields(
    tx: &Writer,
    kind: &str,
    label: &str,
    id: &str,
    fields: &[UniqueField<'_>],
) -> StorageResult<()> {
    let mut errors = FieldErrors::default();
    for f in fields {
        let Some(new) = f.new else { continue };
        if f.old == Some(new) {
            continue;
        }
        if !tx.claim_unique(kind, f.field, new, id)? {
            errors.add(
                f.field,
                format!("{label} with this {} already exists.", f.field.replace('_', " ")),
            );
        }
    }
    errors.into_result()?;

    for f in fields {
        if let Some(old) = f.old {
            if f.new != Some(old) {
                tx.release_unique(kind, f.field, old)?;
            }
        }
    }
    Ok(())
}

/// Validate the length of a required text column.
pub(crate) fn check_required(errors: &mut FieldErrors, field: &str, value: &str, max: usize) {
    if value.trim().is_empty() {
        errors.add(field, "This field may not be blank.");
    } else {
        check_length(errors, field, Some(value), max);
    }
}

/// Validate the length of an optional text column.
pub(crate) fn check_length(errors: &mut FieldErrors, field: &str, value: Option<&str>, max: usize) {
    if let Some(value) = value {
        if value.chars().count() > max {
            errors.add(
                field,
                format!("Ensure this field has no more than {max} characters."),
            );
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Record builders shared by repository and ledger tests.

    use super::*;
    use crate::models::Price;
    use chrono::Utc;

    pub fn temp_store() -> (crate::storage::Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::storage::Store::open(&dir.path().join("test.redb")).unwrap();
        (store, dir)
    }

    pub fn user(email: &str) -> StoredUser {
        let now = Utc::now();
        StoredUser {
            id: new_id(),
            email: email.to_string(),
            username: None,
            phone_number: None,
            first_name: String::new(),
            last_name: String::new(),
            password_hash: "pbkdf2_sha256$1$AAAA$AAAA".to_string(),
            wipes_remaining: 0,
            green_credits: 0,
            current_subscription_package: None,
            is_staff: false,
            is_superuser: false,
            is_active: true,
            date_joined: now,
            updated_at: now,
            last_login: None,
        }
    }

    pub fn certificate(user_id: &str, serial: &str) -> StoredCertificate {
        StoredCertificate {
            id: new_id(),
            user_id: user_id.to_string(),
            user_subscription: None,
            device_serial_number: serial.to_string(),
            wiping_method: WipingMethod::NistPurge,
            status: CertificateStatus::Pending,
            wiped_at: Utc::now(),
            completed_at: None,
            device_type: Some(DeviceType::Ssd),
            operating_system: None,
            health_score_at_wipe: None,
            blockchain_tx_hash: None,
            qr_code_data: None,
            generated_at: Utc::now(),
            is_invalidated: false,
        }
    }

    pub fn listing(user_id: &str, title: &str) -> StoredListing {
        let now = Utc::now();
        StoredListing {
            id: new_id(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            description: None,
            price: Price::from_minor(10_000).unwrap_or_default(),
            category: None,
            brand: None,
            model_name: None,
            condition: ListingCondition::Good,
            health_score: None,
            status: ListingStatus::Active,
            created_at: now,
            updated_at: now,
            is_redeemable_with_green_credits: false,
            green_credit_price: None,
            certificate: None,
        }
    }

    pub fn package(name: &str, wipes_allowed: u32) -> StoredPackage {
        StoredPackage {
            id: new_id(),
            name: name.to_string(),
            description: None,
            wipes_allowed,
            green_credits_awarded: 0,
            price: Price::from_minor(4_999).unwrap_or_default(),
            is_active: true,
        }
    }

    pub fn subscription(user_id: &str, package_id: &str, allocated: u32) -> StoredSubscription {
        StoredSubscription {
            id: new_id(),
            user_id: user_id.to_string(),
            package: package_id.to_string(),
            start_date: Utc::now(),
            end_date: None,
            status: SubscriptionStatus::Active,
            initial_wipes_allocated: allocated,
            wipes_used: 0,
            payment_details: None,
        }
    }
}
