// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Subscription purchase, status transitions and staff edits.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{append_entry, Ledger, LedgerEntry, LedgerError, LedgerResult};
use crate::storage::repository::{
    new_id, PackageRepository, StoredPackage, StoredSubscription, StoredUser,
    SubscriptionRepository, SubscriptionStatus, TransactionType, UserRepository,
};
use crate::storage::Writer;

/// Input for [`Ledger::purchase_subscription`].
#[derive(Debug, Clone, Default)]
pub struct PurchaseRequest {
    pub user_id: String,
    pub package_id: String,
    /// `active` (default) or `trial`
    pub status: Option<SubscriptionStatus>,
    pub end_date: Option<DateTime<Utc>>,
    /// Overrides the package's `wipes_allowed`
    pub initial_wipes_allocated: Option<u32>,
    pub payment_details: Option<Value>,
    /// Set when staff record the purchase after payment cleared
    pub recorded_by_staff: bool,
}

/// Partial subscription update applied in one transaction.
///
/// Everything except `status` is staff only.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionPatch {
    pub status: Option<SubscriptionStatus>,
    pub end_date: Option<Option<DateTime<Utc>>>,
    pub initial_wipes_allocated: Option<u32>,
    pub wipes_used: Option<u32>,
    pub payment_details: Option<Option<Value>>,
}

impl SubscriptionPatch {
    pub fn status(to: SubscriptionStatus) -> Self {
        Self {
            status: Some(to),
            ..Default::default()
        }
    }

    pub fn touches_staff_fields(&self) -> bool {
        self.end_date.is_some()
            || self.initial_wipes_allocated.is_some()
            || self.wipes_used.is_some()
            || self.payment_details.is_some()
    }
}

/// Who may move a subscription from one status to another.
enum TransitionRule {
    OwnerOrStaff,
    StaffOnly,
}

fn transition_rule(from: SubscriptionStatus, to: SubscriptionStatus) -> Option<TransitionRule> {
    use SubscriptionStatus::*;
    match (from, to) {
        (Trial, Active) | (Trial | Active, Expired) => Some(TransitionRule::StaffOnly),
        (Trial | Active, Cancelled) => Some(TransitionRule::OwnerOrStaff),
        _ => None,
    }
}

/// Credit the package's award to `user`. Persists the user either way.
fn award_package_credits(tx: &Writer, user: &mut StoredUser, package: &StoredPackage) -> LedgerResult<()> {
    let credits = package.green_credits_awarded;
    if credits > 0 {
        append_entry(
            tx,
            user,
            LedgerEntry::new(credits, TransactionType::Other).describe(format!(
                "Awarded {credits} green credits for purchasing the {} package.",
                package.name
            )),
        )?;
    } else {
        user.updated_at = Utc::now();
        UserRepository::new(tx).update(user)?;
    }
    Ok(())
}

impl Ledger {
    /// Buy a package: create the subscription and make the package current.
    ///
    /// Package credits are paid out only once staff have confirmed the
    /// purchase: here when staff record an active subscription, otherwise
    /// when staff activate the trial.
    pub fn purchase_subscription(&self, request: PurchaseRequest) -> LedgerResult<StoredSubscription> {
        let status = request.status.unwrap_or_default();
        if !status.is_live() {
            return Err(LedgerError::invalid(
                "status",
                "New subscriptions must be active or trial.",
            ));
        }

        let (subscription, awarded) = self.store.write(|tx| -> LedgerResult<_> {
            let package = PackageRepository::new(tx).get(&request.package_id)?;
            if !package.is_active {
                return Err(LedgerError::invalid(
                    "package",
                    "This package is not available for purchase.",
                ));
            }

            let subscription = StoredSubscription {
                id: new_id(),
                user_id: request.user_id.clone(),
                package: package.id.clone(),
                start_date: Utc::now(),
                end_date: request.end_date,
                status,
                initial_wipes_allocated: request
                    .initial_wipes_allocated
                    .unwrap_or(package.wipes_allowed),
                wipes_used: 0,
                payment_details: request.payment_details.clone(),
            };
            SubscriptionRepository::new(tx).create(&subscription)?;

            let mut user = UserRepository::new(tx).get(&request.user_id)?;
            user.current_subscription_package = Some(package.id.clone());
            let award = request.recorded_by_staff && status == SubscriptionStatus::Active;
            if award {
                award_package_credits(tx, &mut user, &package)?;
            } else {
                user.updated_at = Utc::now();
                UserRepository::new(tx).update(&user)?;
            }
            Ok((subscription, award))
        })?;

        tracing::info!(
            subscription_id = %subscription.id,
            user_id = %subscription.user_id,
            package_id = %subscription.package,
            allocated = subscription.initial_wipes_allocated,
            credits_awarded = awarded,
            "Subscription purchased"
        );
        Ok(subscription)
    }

    /// Move a subscription to a new status.
    pub fn transition_subscription(
        &self,
        subscription_id: &str,
        to: SubscriptionStatus,
        actor_is_staff: bool,
    ) -> LedgerResult<StoredSubscription> {
        self.update_subscription(subscription_id, SubscriptionPatch::status(to), actor_is_staff)
    }

    /// Apply a status change and field edits together; nothing is written
    /// unless all of them succeed.
    ///
    /// Expired and cancelled are terminal. Activating a trial and expiring
    /// are staff actions and activating pays out the package credits;
    /// cancelling is open to the owner. Ending a subscription stamps
    /// `end_date` when it is unset or in the future, unless the patch sets
    /// one explicitly.
    pub fn update_subscription(
        &self,
        subscription_id: &str,
        patch: SubscriptionPatch,
        actor_is_staff: bool,
    ) -> LedgerResult<StoredSubscription> {
        if patch.touches_staff_fields() && !actor_is_staff {
            return Err(LedgerError::StaffOnly);
        }

        let (subscription, from) = self.store.write(|tx| -> LedgerResult<_> {
            let repo = SubscriptionRepository::new(tx);
            let mut subscription = repo.get(subscription_id)?;
            let from = subscription.status;

            if let Some(to) = patch.status.filter(|to| *to != from) {
                match transition_rule(from, to) {
                    None => return Err(LedgerError::transition(from, to)),
                    Some(TransitionRule::StaffOnly) if !actor_is_staff => {
                        return Err(LedgerError::StaffOnly)
                    }
                    Some(_) => {}
                }

                let now = Utc::now();
                if !to.is_live() && subscription.end_date.is_none_or(|end| end > now) {
                    subscription.end_date = Some(now);
                }
                if from == SubscriptionStatus::Trial && to == SubscriptionStatus::Active {
                    let package = PackageRepository::new(tx).get(&subscription.package)?;
                    let mut user = UserRepository::new(tx).get(&subscription.user_id)?;
                    award_package_credits(tx, &mut user, &package)?;
                }
                subscription.status = to;
            }

            if let Some(end_date) = patch.end_date {
                subscription.end_date = end_date;
            }
            if let Some(allocated) = patch.initial_wipes_allocated {
                subscription.initial_wipes_allocated = allocated;
            }
            if let Some(used) = patch.wipes_used {
                subscription.wipes_used = used;
            }
            if let Some(details) = patch.payment_details.clone() {
                subscription.payment_details = details;
            }

            repo.update(&subscription)?;
            Ok((subscription, from))
        })?;

        if from != subscription.status {
            tracing::info!(
                subscription_id,
                from = ?from,
                to = ?subscription.status,
                "Subscription status changed"
            );
        }
        Ok(subscription)
    }
}
