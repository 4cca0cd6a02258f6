// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User subscription repository.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use super::super::database::{EntityTable, ReadTables, Record, Writer, SUBSCRIPTIONS};
use super::super::{StorageError, StorageResult};
use super::certificates::StoredCertificate;
use super::packages::StoredPackage;
use super::users::StoredUser;
use super::require;
use crate::models::FieldErrors;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Active,
    Expired,
    Cancelled,
    Trial,
}

impl SubscriptionStatus {
    /// Active or trial: the subscription can still be consumed.
    pub fn is_live(self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trial)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredSubscription {
    pub id: String,
    pub user_id: String,
    pub package: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: SubscriptionStatus,
    /// Wipes granted by this subscription (0 = unlimited)
    pub initial_wipes_allocated: u32,
    /// Wipes consumed so far; never decreases
    pub wipes_used: u32,
    /// Opaque payment gateway metadata
    pub payment_details: Option<Value>,
}

impl StoredSubscription {
    /// Wipes left, or `None` when the allowance is unlimited.
    pub fn wipes_left(&self) -> Option<u32> {
        (self.initial_wipes_allocated > 0)
            .then(|| self.initial_wipes_allocated.saturating_sub(self.wipes_used))
    }

    /// Whether the end date has passed.
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end_date.is_some_and(|end| end <= now)
    }
}

impl Record for StoredSubscription {
    const TABLE: EntityTable = SUBSCRIPTIONS;
    const KIND: &'static str = "user_subscription";

    fn id(&self) -> &str {
        &self.id
    }
}

impl super::super::OwnedResource for StoredSubscription {
    const RESOURCE: crate::auth::Resource = crate::auth::Resource::UserSubscription;

    fn owner_user_id(&self) -> &str {
        &self.user_id
    }
}

pub struct SubscriptionRepository<'a, S> {
    tx: &'a S,
}

impl<'a, S: ReadTables> SubscriptionRepository<'a, S> {
    pub fn new(tx: &'a S) -> Self {
        Self { tx }
    }

    pub fn get(&self, id: &str) -> StorageResult<StoredSubscription> {
        require(self.tx, id)
    }

    /// All subscriptions, most recent first.
    pub fn list(&self) -> StorageResult<Vec<StoredSubscription>> {
        let mut subscriptions: Vec<StoredSubscription> = self.tx.scan()?;
        subscriptions.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Ok(subscriptions)
    }

    fn validate(&self, subscription: &StoredSubscription) -> StorageResult<()> {
        let mut errors = FieldErrors::default();
        if self.tx.get::<StoredUser>(&subscription.user_id)?.is_none() {
            errors.add(
                "user",
                format!("Invalid pk \"{}\" - object does not exist.", subscription.user_id),
            );
        }
        if self.tx.get::<StoredPackage>(&subscription.package)?.is_none() {
            errors.add(
                "package",
                format!("Invalid pk \"{}\" - object does not exist.", subscription.package),
            );
        }
        if subscription
            .end_date
            .is_some_and(|end| end < subscription.start_date)
        {
            errors.add("end_date", "End date must not be before the start date.");
        }
        if subscription.initial_wipes_allocated > 0
            && subscription.wipes_used > subscription.initial_wipes_allocated
        {
            errors.add("wipes_used", "Wipes used cannot exceed the allocation.");
        }
        Ok(errors.into_result()?)
    }
}

impl SubscriptionRepository<'_, Writer> {
    pub fn create(&self, subscription: &StoredSubscription) -> StorageResult<()> {
        self.validate(subscription)?;
        self.tx.put(subscription)?;
        Ok(())
    }

    pub fn update(&self, subscription: &StoredSubscription) -> StorageResult<()> {
        let previous = self.get(&subscription.id)?;
        if subscription.wipes_used < previous.wipes_used {
            return Err(StorageError::invalid(
                "wipes_used",
                "Wipes used can never decrease.",
            ));
        }
        self.validate(subscription)?;
        self.tx.put(subscription)?;
        Ok(())
    }

    /// Delete a subscription that is no longer live.
    ///
    /// Certificates that consumed its allowance keep their other data and
    /// lose the link.
    pub fn delete(&self, id: &str) -> StorageResult<StoredSubscription> {
        let subscription = self.get(id)?;
        if subscription.status.is_live() {
            return Err(StorageError::Protected {
                resource: StoredSubscription::KIND,
                reason: "active or trial subscriptions must be cancelled first".to_string(),
            });
        }

        for mut cert in self
            .tx
            .filter(|c: &StoredCertificate| c.user_subscription.as_deref() == Some(id))?
        {
            cert.user_subscription = None;
            self.tx.put(&cert)?;
        }

        self.tx.remove::<StoredSubscription>(id)?;
        Ok(subscription)
    }
}
