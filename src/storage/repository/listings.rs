// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Marketplace listing repository.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::super::database::{EntityTable, ReadTables, Record, Writer, LISTINGS};
use super::super::{StorageError, StorageResult};
use super::categories::StoredCategory;
use super::certificates::StoredCertificate;
use super::credits::StoredCreditTransaction;
use super::media::StoredListingMedia;
use super::users::StoredUser;
use super::{check_length, check_reference, check_required, claim_unique_fields, require, UniqueField};
use crate::models::{FieldErrors, Price};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ListingCondition {
    New,
    LikeNew,
    #[default]
    Good,
    Fair,
    Poor,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    #[default]
    Active,
    Sold,
    Pending,
    Withdrawn,
    Draft,
}

/// Listing stored in the `listings` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredListing {
    pub id: String,
    /// Seller
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub price: Price,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub model_name: Option<String>,
    pub condition: ListingCondition,
    pub health_score: Option<i32>,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_redeemable_with_green_credits: bool,
    /// Credits needed to redeem; set and positive when redeemable
    pub green_credit_price: Option<i64>,
    /// Certificate of the wiped device (one listing per certificate)
    pub certificate: Option<String>,
}

impl Record for StoredListing {
    const TABLE: EntityTable = LISTINGS;
    const KIND: &'static str = "listing";

    fn id(&self) -> &str {
        &self.id
    }
}

impl super::super::OwnedResource for StoredListing {
    const RESOURCE: crate::auth::Resource = crate::auth::Resource::Listing;

    fn owner_user_id(&self) -> &str {
        &self.user_id
    }
}

/// Query filters for the listing collection.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListingFilter {
    /// Category id
    pub category: Option<String>,
    pub status: Option<ListingStatus>,
    /// Seller id
    pub user: Option<String>,
    /// Only listings redeemable (or not) with green credits
    pub redeemable: Option<bool>,
}

impl ListingFilter {
    pub fn matches(&self, listing: &StoredListing) -> bool {
        self.category
            .as_deref()
            .is_none_or(|c| listing.category.as_deref() == Some(c))
            && self.status.is_none_or(|s| listing.status == s)
            && self.user.as_deref().is_none_or(|u| listing.user_id == u)
            && self
                .redeemable
                .is_none_or(|r| listing.is_redeemable_with_green_credits == r)
    }
}

pub struct ListingRepository<'a, S> {
    tx: &'a S,
}

impl<'a, S: ReadTables> ListingRepository<'a, S> {
    pub fn new(tx: &'a S) -> Self {
        Self { tx }
    }

    pub fn get(&self, id: &str) -> StorageResult<StoredListing> {
        require(self.tx, id)
    }

    /// Listings matching a filter, newest first.
    pub fn list(&self, filter: &ListingFilter) -> StorageResult<Vec<StoredListing>> {
        let mut listings = self.tx.filter(|l: &StoredListing| filter.matches(l))?;
        listings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(listings)
    }

    /// Whether any ledger row references the listing.
    pub fn has_ledger_history(&self, id: &str) -> StorageResult<bool> {
        Ok(!self
            .tx
            .filter(|t: &StoredCreditTransaction| t.listing.as_deref() == Some(id))?
            .is_empty())
    }

    fn validate(&self, listing: &StoredListing) -> StorageResult<()> {
        let mut errors = FieldErrors::default();
        check_required(&mut errors, "title", &listing.title, 255);
        check_length(&mut errors, "brand", listing.brand.as_deref(), 100);
        check_length(&mut errors, "model_name", listing.model_name.as_deref(), 100);
        if let Some(score) = listing.health_score {
            if !(0..=100).contains(&score) {
                errors.add("health_score", "Ensure this value is between 0 and 100.");
            }
        }

        if listing.is_redeemable_with_green_credits {
            match listing.green_credit_price {
                None => errors.add(
                    "green_credit_price",
                    "This field is required when the listing is redeemable with green credits.",
                ),
                Some(price) if price <= 0 => {
                    errors.add("green_credit_price", "Ensure this value is greater than 0.")
                }
                Some(_) => {}
            }
        } else if listing.green_credit_price.is_some_and(|p| p < 0) {
            errors.add("green_credit_price", "Ensure this value is greater than or equal to 0.");
        }

        if self.tx.get::<StoredUser>(&listing.user_id)?.is_none() {
            errors.add("user", format!("Invalid pk \"{}\" - object does not exist.", listing.user_id));
        }
        check_reference::<StoredCategory, _>(self.tx, &mut errors, "category", listing.category.as_deref())?;

        if let Some(cert_id) = listing.certificate.as_deref() {
            match self.tx.get::<StoredCertificate>(cert_id)? {
                None => errors.add(
                    "certificate",
                    format!("Invalid pk \"{cert_id}\" - object does not exist."),
                ),
                Some(cert) if cert.user_id != listing.user_id => {
                    errors.add("certificate", "The certificate must belong to the seller.")
                }
                Some(cert) if cert.is_invalidated => {
                    errors.add("certificate", "The certificate has been invalidated.")
                }
                Some(_) => {}
            }
        }

        Ok(errors.into_result()?)
    }
}

impl ListingRepository<'_, Writer> {
    pub fn create(&self, listing: &StoredListing) -> StorageResult<()> {
        self.store(None, listing)
    }

    pub fn update(&self, listing: &StoredListing) -> StorageResult<()> {
        let previous = self.get(&listing.id)?;
        self.store(Some(&previous), listing)
    }

    /// Change only the status. Ledger operations use this so a sale or
    /// refund never fails on unrelated field checks.
    pub fn set_status(&self, id: &str, status: ListingStatus) -> StorageResult<StoredListing> {
        let mut listing = self.get(id)?;
        listing.status = status;
        listing.updated_at = Utc::now();
        self.tx.put(&listing)?;
        Ok(listing)
    }

    /// Delete a listing and its media.
    ///
    /// Listings referenced by ledger rows are protected so balances stay
    /// explainable.
    pub fn delete(&self, id: &str) -> StorageResult<StoredListing> {
        let listing = self.get(id)?;
        if self.has_ledger_history(id)? {
            return Err(StorageError::Protected {
                resource: StoredListing::KIND,
                reason: "the listing is referenced by green credit transactions".to_string(),
            });
        }

        for media in self
            .tx
            .filter(|m: &StoredListingMedia| m.listing == id)?
        {
            if media.is_primary {
                self.tx
                    .release_unique(StoredListingMedia::KIND, "primary", id)?;
            }
            self.tx.remove::<StoredListingMedia>(&media.id)?;
        }

        if let Some(cert_id) = &listing.certificate {
            self.tx
                .release_unique(StoredListing::KIND, "certificate", cert_id)?;
        }
        self.tx.remove::<StoredListing>(id)?;
        Ok(listing)
    }

    fn store(&self, previous: Option<&StoredListing>, listing: &StoredListing) -> StorageResult<()> {
        self.validate(listing)?;
        claim_unique_fields(
            self.tx,
            StoredListing::KIND,
            "listing",
            &listing.id,
            &[UniqueField {
                field: "certificate",
                old: previous.and_then(|p| p.certificate.as_deref()),
                new: listing.certificate.as_deref(),
            }],
        )?;
        self.tx.put(listing)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::repository::fixtures::{certificate, listing, temp_store, user};
    use crate::storage::repository::{CertificateRepository, UserRepository};

    #[test]
    fn redeemable_listing_needs_positive_price() {
        let (store, _dir) = temp_store();
        let seller = user("seller@example.com");
        let mut item = listing(&seller.id, "Phone");
        item.is_redeemable_with_green_credits = true;

        let result = store.write(|w| {
            UserRepository::new(w).create(&seller)?;
            ListingRepository::new(w).create(&item)
        });
        match result {
            Err(StorageError::Validation(errors)) => assert!(errors.get("green_credit_price").is_some()),
            other => panic!("expected validation error, got {other:?}"),
        }

        item.green_credit_price = Some(0);
        let result = store.write(|w| {
            UserRepository::new(w).create(&seller)?;
            ListingRepository::new(w).create(&item)
        });
        assert!(matches!(result, Err(StorageError::Validation(_))));
    }

    #[test]
    fn certificate_must_belong_to_seller_and_is_single_use() {
        let (store, _dir) = temp_store();
        let seller = user("seller@example.com");
        let other = user("other@example.com");
        let cert = certificate(&other.id, "SN-9");

        store
            .write(|w| {
                UserRepository::new(w).create(&seller)?;
                UserRepository::new(w).create(&other)?;
                CertificateRepository::new(w).create(&cert)
            })
            .unwrap();

        let mut foreign = listing(&seller.id, "Not mine");
        foreign.certificate = Some(cert.id.clone());
        let result = store.write(|w| ListingRepository::new(w).create(&foreign));
        assert!(matches!(result, Err(StorageError::Validation(_))));

        let mut first = listing(&other.id, "First");
        first.certificate = Some(cert.id.clone());
        store
            .write(|w| ListingRepository::new(w).create(&first))
            .unwrap();

        let mut second = listing(&other.id, "Second");
        second.certificate = Some(cert.id.clone());
        let result = store.write(|w| ListingRepository::new(w).create(&second));
        assert!(matches!(result, Err(StorageError::Validation(_))));
    }

    #[test]
    fn filter_by_status_and_redeemable() {
        let (store, _dir) = temp_store();
        let seller = user("seller@example.com");
        let mut redeemable = listing(&seller.id, "Redeemable");
        redeemable.is_redeemable_with_green_credits = true;
        redeemable.green_credit_price = Some(25);
        let mut sold = listing(&seller.id, "Sold");
        sold.status = ListingStatus::Sold;

        store
            .write(|w| {
                UserRepository::new(w).create(&seller)?;
                let repo = ListingRepository::new(w);
                repo.create(&redeemable)?;
                repo.create(&sold)
            })
            .unwrap();

        let filter = ListingFilter {
            redeemable: Some(true),
            ..Default::default()
        };
        let found = store.read(|r| ListingRepository::new(r).list(&filter)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, redeemable.id);

        let filter = ListingFilter {
            status: Some(ListingStatus::Sold),
            user: Some(seller.id.clone()),
            ..Default::default()
        };
        let found = store.read(|r| ListingRepository::new(r).list(&filter)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, sold.id);
    }
}
