// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Subscription package repository.
//!
//! A package that backs a live (active or trial) subscription may only have
//! `is_active` toggled. Any referencing subscription blocks deletion.

use serde::{Deserialize, Serialize};

use super::super::database::{EntityTable, ReadTables, Record, Writer, PACKAGES};
use super::super::{StorageError, StorageResult};
use super::subscriptions::StoredSubscription;
use super::users::StoredUser;
use super::{check_length, check_required, claim_unique_fields, require, UniqueField};
use crate::models::{FieldErrors, Price};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredPackage {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Wipes granted per subscription (0 = unlimited)
    pub wipes_allowed: u32,
    /// Credits awarded on purchase
    pub green_credits_awarded: i64,
    pub price: Price,
    pub is_active: bool,
}

impl StoredPackage {
    /// Same record ignoring `is_active`.
    fn same_terms(&self, other: &StoredPackage) -> bool {
        self.name == other.name
            && self.description == other.description
            && self.wipes_allowed == other.wipes_allowed
            && self.green_credits_awarded == other.green_credits_awarded
            && self.price == other.price
    }
}

impl Record for StoredPackage {
    const TABLE: EntityTable = PACKAGES;
    const KIND: &'static str = "subscription_package";

    fn id(&self) -> &str {
        &self.id
    }
}

pub struct PackageRepository<'a, S> {
    tx: &'a S,
}

impl<'a, S: ReadTables> PackageRepository<'a, S> {
    pub fn new(tx: &'a S) -> Self {
        Self { tx }
    }

    pub fn get(&self, id: &str) -> StorageResult<StoredPackage> {
        require(self.tx, id)
    }

    /// Packages ordered by price, then name.
    pub fn list(&self) -> StorageResult<Vec<StoredPackage>> {
        let mut packages: Vec<StoredPackage> = self.tx.scan()?;
        packages.sort_by(|a, b| a.price.cmp(&b.price).then_with(|| a.name.cmp(&b.name)));
        Ok(packages)
    }

    /// Subscriptions referencing the package.
    fn subscriptions(&self, package_id: &str) -> StorageResult<Vec<StoredSubscription>> {
        Ok(self
            .tx
            .filter(|s: &StoredSubscription| s.package == package_id)?)
    }

    fn validate(&self, package: &StoredPackage) -> StorageResult<()> {
        let mut errors = FieldErrors::default();
        check_required(&mut errors, "name", &package.name, 100);
        check_length(&mut errors, "description", package.description.as_deref(), 10_000);
        if package.green_credits_awarded < 0 {
            errors.add(
                "green_credits_awarded",
                "Ensure this value is greater than or equal to 0.",
            );
        }
        Ok(errors.into_result()?)
    }
}

impl PackageRepository<'_, Writer> {
    pub fn create(&self, package: &StoredPackage) -> StorageResult<()> {
        self.store(None, package)
    }

    /// Update a package. Terms are frozen while a live subscription uses it.
    pub fn update(&self, package: &StoredPackage) -> StorageResult<()> {
        let previous = self.get(&package.id)?;
        if !previous.same_terms(package)
            && self
                .subscriptions(&package.id)?
                .iter()
                .any(|s| s.status.is_live())
        {
            return Err(StorageError::invalid(
                "non_field_errors",
                "Only is_active can change while subscriptions use this package.",
            ));
        }
        self.store(Some(&previous), package)
    }

    /// Delete a package that no subscription references.
    pub fn delete(&self, id: &str) -> StorageResult<StoredPackage> {
        let package = self.get(id)?;
        if !self.subscriptions(id)?.is_empty() {
            return Err(StorageError::Protected {
                resource: StoredPackage::KIND,
                reason: "the package is referenced by user subscriptions".to_string(),
            });
        }

        for mut user in self
            .tx
            .filter(|u: &StoredUser| u.current_subscription_package.as_deref() == Some(id))?
        {
            user.current_subscription_package = None;
            self.tx.put(&user)?;
        }

        self.tx
            .release_unique(StoredPackage::KIND, "name", &package.name)?;
        self.tx.remove::<StoredPackage>(id)?;
        Ok(package)
    }

    fn store(&self, previous: Option<&StoredPackage>, package: &StoredPackage) -> StorageResult<()> {
        self.validate(package)?;
        claim_unique_fields(
            self.tx,
            StoredPackage::KIND,
            "subscription package",
            &package.id,
            &[UniqueField {
                field: "name",
                old: previous.map(|p| p.name.as_str()),
                new: Some(&package.name),
            }],
        )?;
        self.tx.put(package)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::repository::fixtures::{package, subscription, temp_store, user};
    use crate::storage::repository::{SubscriptionRepository, SubscriptionStatus, UserRepository};

    #[test]
    fn live_subscription_freezes_terms_but_not_is_active() {
        let (store, _dir) = temp_store();
        let owner = user("sub@example.com");
        let mut pkg = package("Pro", 10);
        let sub = subscription(&owner.id, &pkg.id, 10);
        store
            .write(|w| {
                UserRepository::new(w).create(&owner)?;
                PackageRepository::new(w).create(&pkg)?;
                SubscriptionRepository::new(w).create(&sub)
            })
            .unwrap();

        pkg.wipes_allowed = 20;
        let result = store.write(|w| PackageRepository::new(w).update(&pkg));
        assert!(matches!(result, Err(StorageError::Validation(_))));

        pkg.wipes_allowed = 10;
        pkg.is_active = false;
        store
            .write(|w| PackageRepository::new(w).update(&pkg))
            .unwrap();
    }

    #[test]
    fn terms_editable_once_subscriptions_end() {
        let (store, _dir) = temp_store();
        let owner = user("sub@example.com");
        let mut pkg = package("Basic", 3);
        let mut sub = subscription(&owner.id, &pkg.id, 3);
        sub.status = SubscriptionStatus::Expired;
        store
            .write(|w| {
                UserRepository::new(w).create(&owner)?;
                PackageRepository::new(w).create(&pkg)?;
                SubscriptionRepository::new(w).create(&sub)
            })
            .unwrap();

        pkg.description = Some("Refreshed".to_string());
        store
            .write(|w| PackageRepository::new(w).update(&pkg))
            .unwrap();
    }

    #[test]
    fn referenced_package_cannot_be_deleted() {
        let (store, _dir) = temp_store();
        let owner = user("sub@example.com");
        let pkg = package("Pro", 10);
        let sub = subscription(&owner.id, &pkg.id, 10);
        store
            .write(|w| {
                UserRepository::new(w).create(&owner)?;
                PackageRepository::new(w).create(&pkg)?;
                SubscriptionRepository::new(w).create(&sub)
            })
            .unwrap();

        let result = store.write(|w| PackageRepository::new(w).delete(&pkg.id));
        assert!(matches!(result, Err(StorageError::Protected { .. })));
    }

    #[test]
    fn unused_package_is_deleted_and_name_freed() {
        let (store, _dir) = temp_store();
        let pkg = package("Trial", 1);
        store
            .write(|w| PackageRepository::new(w).create(&pkg))
            .unwrap();
        store
            .write(|w| PackageRepository::new(w).delete(&pkg.id))
            .unwrap();
        store
            .write(|w| PackageRepository::new(w).create(&package("Trial", 1)))
            .unwrap();
    }
}
