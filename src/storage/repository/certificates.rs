// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wipe certificate repository.
//!
//! The repository enforces column-level rules (unique serial and hash,
//! health score range, references). Status transitions and the credit award
//! on completion are ledger concerns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::database::{EntityTable, ReadTables, Record, Writer, CERTIFICATES};
use super::super::{StorageError, StorageResult};
use super::listings::StoredListing;
use super::subscriptions::StoredSubscription;
use super::users::StoredUser;
use super::{check_length, check_reference, check_required, claim_unique_fields, require, UniqueField};
use crate::models::FieldErrors;

/// Erasure standard used for a wipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WipingMethod {
    NistClear,
    NistPurge,
    #[serde(rename = "dod_5220_22m")]
    Dod522022m,
    Other,
}

/// Wipe outcome. `Success` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    #[default]
    Pending,
    Success,
    Failed,
}

impl CertificateStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, CertificateStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Hdd,
    Ssd,
    Emmc,
    Nvme,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OperatingSystem {
    Windows,
    Linux,
    Android,
    Macos,
    Ios,
    Other,
}

/// Certificate stored in the `certificates` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredCertificate {
    pub id: String,
    /// Owner (the user whose device was wiped)
    pub user_id: String,
    /// Subscription whose allowance paid for the wipe, if any
    pub user_subscription: Option<String>,
    pub device_serial_number: String,
    pub wiping_method: WipingMethod,
    pub status: CertificateStatus,
    pub wiped_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub device_type: Option<DeviceType>,
    pub operating_system: Option<OperatingSystem>,
    pub health_score_at_wipe: Option<i32>,
    pub blockchain_tx_hash: Option<String>,
    pub qr_code_data: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub is_invalidated: bool,
}

impl Record for StoredCertificate {
    const TABLE: EntityTable = CERTIFICATES;
    const KIND: &'static str = "certificate";

    fn id(&self) -> &str {
        &self.id
    }
}

impl super::super::OwnedResource for StoredCertificate {
    const RESOURCE: crate::auth::Resource = crate::auth::Resource::Certificate;

    fn owner_user_id(&self) -> &str {
        &self.user_id
    }
}

pub struct CertificateRepository<'a, S> {
    tx: &'a S,
}

impl<'a, S: ReadTables> CertificateRepository<'a, S> {
    pub fn new(tx: &'a S) -> Self {
        Self { tx }
    }

    pub fn get(&self, id: &str) -> StorageResult<StoredCertificate> {
        require(self.tx, id)
    }

    /// All certificates, newest first.
    pub fn list(&self) -> StorageResult<Vec<StoredCertificate>> {
        let mut certificates: Vec<StoredCertificate> = self.tx.scan()?;
        certificates.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        Ok(certificates)
    }

    /// Certificates owned by a user, newest first.
    pub fn list_by_owner(&self, user_id: &str) -> StorageResult<Vec<StoredCertificate>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|c| c.user_id == user_id)
            .collect())
    }

    fn validate(&self, certificate: &StoredCertificate) -> StorageResult<()> {
        let mut errors = FieldErrors::default();
        check_required(&mut errors, "device_serial_number", &certificate.device_serial_number, 255);
        check_length(&mut errors, "blockchain_tx_hash", certificate.blockchain_tx_hash.as_deref(), 255);
        if let Some(score) = certificate.health_score_at_wipe {
            if !(0..=100).contains(&score) {
                errors.add("health_score_at_wipe", "Ensure this value is between 0 and 100.");
            }
        }
        if self.tx.get::<StoredUser>(&certificate.user_id)?.is_none() {
            errors.add("user", format!("Invalid pk \"{}\" - object does not exist.", certificate.user_id));
        }
        check_reference::<StoredSubscription, _>(
            self.tx,
            &mut errors,
            "user_subscription",
            certificate.user_subscription.as_deref(),
        )?;
        Ok(errors.into_result()?)
    }
}

impl CertificateRepository<'_, Writer> {
    pub fn create(&self, certificate: &StoredCertificate) -> StorageResult<()> {
        self.store(None, certificate)
    }

    pub fn update(&self, certificate: &StoredCertificate) -> StorageResult<()> {
        let previous = self.get(&certificate.id)?;
        self.store(Some(&previous), certificate)
    }

    /// Delete a certificate and detach the listing that references it.
    pub fn delete(&self, id: &str) -> StorageResult<StoredCertificate> {
        let certificate = self.get(id)?;

        let now = Utc::now();
        for mut listing in self
            .tx
            .filter(|l: &StoredListing| l.certificate.as_deref() == Some(id))?
        {
            self.tx
                .release_unique(StoredListing::KIND, "certificate", id)?;
            listing.certificate = None;
            listing.updated_at = now;
            self.tx.put(&listing)?;
        }

        self.tx.release_unique(
            StoredCertificate::KIND,
            "device_serial_number",
            &certificate.device_serial_number,
        )?;
        if let Some(hash) = &certificate.blockchain_tx_hash {
            self.tx
                .release_unique(StoredCertificate::KIND, "blockchain_tx_hash", hash)?;
        }
        if !self.tx.remove::<StoredCertificate>(id)? {
            return Err(StorageError::not_found(StoredCertificate::KIND, id));
        }
        Ok(certificate)
    }

    fn store(&self, previous: Option<&StoredCertificate>, certificate: &StoredCertificate) -> StorageResult<()> {
        self.validate(certificate)?;
        claim_unique_fields(
            self.tx,
            StoredCertificate::KIND,
            "certificate",
            &certificate.id,
            &[
                UniqueField {
                    field: "device_serial_number",
                    old: previous.map(|p| p.device_serial_number.as_str()),
                    new: Some(&certificate.device_serial_number),
                },
                UniqueField {
                    field: "blockchain_tx_hash",
                    old: previous.and_then(|p| p.blockchain_tx_hash.as_deref()),
                    new: certificate.blockchain_tx_hash.as_deref(),
                },
            ],
        )?;
        self.tx.put(certificate)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::repository::fixtures::{certificate, listing, temp_store, user};
    use crate::storage::repository::{ListingRepository, UserRepository};

    #[test]
    fn wiping_method_uses_wire_names() {
        let json = serde_json::to_string(&WipingMethod::Dod522022m).unwrap();
        assert_eq!(json, r#""dod_5220_22m""#);
        let parsed: WipingMethod = serde_json::from_str(r#""nist_purge""#).unwrap();
        assert_eq!(parsed, WipingMethod::NistPurge);
    }

    #[test]
    fn serial_numbers_are_unique() {
        let (store, _dir) = temp_store();
        let owner = user("owner@example.com");
        store
            .write(|w| {
                UserRepository::new(w).create(&owner)?;
                CertificateRepository::new(w).create(&certificate(&owner.id, "SN-1"))
            })
            .unwrap();

        let result = store.write(|w| CertificateRepository::new(w).create(&certificate(&owner.id, "SN-1")));
        match result {
            Err(StorageError::Validation(errors)) => {
                assert!(errors.get("device_serial_number").is_some())
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn health_score_must_be_a_percentage() {
        let (store, _dir) = temp_store();
        let owner = user("owner@example.com");
        let mut cert = certificate(&owner.id, "SN-2");
        cert.health_score_at_wipe = Some(101);

        let result = store.write(|w| {
            UserRepository::new(w).create(&owner)?;
            CertificateRepository::new(w).create(&cert)
        });
        assert!(matches!(result, Err(StorageError::Validation(_))));
    }

    #[test]
    fn delete_detaches_listing() {
        let (store, _dir) = temp_store();
        let owner = user("owner@example.com");
        let cert = certificate(&owner.id, "SN-3");
        let mut item = listing(&owner.id, "Wiped laptop");
        item.certificate = Some(cert.id.clone());

        store
            .write(|w| {
                UserRepository::new(w).create(&owner)?;
                CertificateRepository::new(w).create(&cert)?;
                ListingRepository::new(w).create(&item)
            })
            .unwrap();

        store
            .write(|w| CertificateRepository::new(w).delete(&cert.id))
            .unwrap();

        let after = store
            .read(|r| ListingRepository::new(r).get(&item.id))
            .unwrap();
        assert!(after.certificate.is_none());
    }

    #[test]
    fn list_by_owner_filters() {
        let (store, _dir) = temp_store();
        let a = user("a@example.com");
        let b = user("b@example.com");
        store
            .write(|w| {
                UserRepository::new(w).create(&a)?;
                UserRepository::new(w).create(&b)?;
                let repo = CertificateRepository::new(w);
                repo.create(&certificate(&a.id, "A-1"))?;
                repo.create(&certificate(&b.id, "B-1"))
            })
            .unwrap();

        let mine = store
            .read(|r| CertificateRepository::new(r).list_by_owner(&a.id))
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].device_serial_number, "A-1");
    }
}
