// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Green-Credit Ledger
//!
//! Every change to a user's `green_credits`, `wipes_remaining` or a
//! subscription's `wipes_used` goes through [`Ledger`]. Each operation runs
//! inside one [`Store::write`] transaction, so its balance update, ledger
//! rows and side records commit together or not at all.
//!
//! ## Invariant
//!
//! For every user, `green_credits` equals the sum of that user's
//! [`StoredCreditTransaction`] amounts and is never negative. The only
//! function that changes a balance is [`append_entry`], which enforces both.
//!
//! ## Concurrency
//!
//! redb admits one write transaction at a time. A balance check and the
//! debit that follows it happen inside the same transaction, so concurrent
//! redemptions cannot jointly overdraw an account.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::storage::repository::{
    new_id, AdminActionRepository, CreditRepository, StoredAdminAction, StoredCreditTransaction,
    StoredUser, TransactionType, UserRepository,
};
use crate::storage::{Store, Writer};

mod error;
mod marketplace;
mod policy;
mod subscriptions;
mod wipes;

pub use error::{LedgerError, LedgerResult};
pub use marketplace::{Redemption, Refund};
pub use policy::LedgerPolicy;
pub use subscriptions::{PurchaseRequest, SubscriptionPatch};

/// Result of an admin adjustment.
#[derive(Debug, Clone)]
pub struct Adjustment {
    pub transaction: StoredCreditTransaction,
    pub balance: i64,
}

/// Cached balance compared against the ledger sum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Reconciliation {
    pub user_id: String,
    /// `green_credits` stored on the account
    pub cached_balance: i64,
    /// Sum of the account's ledger rows
    pub ledger_balance: i64,
    pub consistent: bool,
}

/// Service owning every balance and allowance mutation.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<Store>,
    policy: LedgerPolicy,
}

impl Ledger {
    pub fn new(store: Arc<Store>, policy: LedgerPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }

    /// Create an account and grant the registration allowance.
    ///
    /// Superusers get no grant. Everyone else receives the free wipes and
    /// one `awarded_wipe` row for the matching credits.
    pub fn register(&self, mut user: StoredUser) -> LedgerResult<StoredUser> {
        let grant = !user.is_superuser && self.policy.free_wipes_on_registration > 0;
        user.green_credits = 0;
        user.wipes_remaining = if grant {
            self.policy.free_wipes_on_registration
        } else {
            0
        };

        let user = self.store.write(|tx| -> LedgerResult<_> {
            UserRepository::new(tx).create(&user)?;
            let mut user = UserRepository::new(tx).get(&user.id)?;

            let credits = self.policy.registration_credits();
            if grant && credits > 0 {
                let description = format!(
                    "Initial {credits} green credits awarded for {} free wipes on registration.",
                    self.policy.free_wipes_on_registration
                );
                append_entry(
                    tx,
                    &mut user,
                    LedgerEntry::new(credits, TransactionType::AwardedWipe).describe(description),
                )?;
            }
            Ok(user)
        })?;

        tracing::info!(
            user_id = %user.id,
            wipes = user.wipes_remaining,
            credits = user.green_credits,
            "Account registered"
        );
        Ok(user)
    }

    /// Apply a signed staff adjustment to a balance.
    ///
    /// The resulting balance may never be negative. An admin action row is
    /// written alongside the ledger row.
    pub fn admin_adjust(
        &self,
        actor_id: &str,
        user_id: &str,
        amount: i64,
        reason: Option<&str>,
        ip: Option<&str>,
    ) -> LedgerResult<Adjustment> {
        if amount == 0 {
            return Err(LedgerError::invalid("amount", "Amount must be non-zero."));
        }

        let adjustment = self.store.write(|tx| -> LedgerResult<_> {
            let mut user = UserRepository::new(tx).get(user_id)?;
            let description = match reason {
                Some(reason) => format!("Admin adjustment of {amount}: {reason}"),
                None => format!("Admin adjustment of {amount}"),
            };
            let transaction = append_entry(
                tx,
                &mut user,
                LedgerEntry::new(amount, TransactionType::AdminAdjustment).describe(description),
            )?;

            AdminActionRepository::new(tx).record(
                &StoredAdminAction::new(actor_id, "adjust_credits")
                    .target("users", user_id)
                    .reason(reason)
                    .ip(ip),
            )?;

            Ok(Adjustment {
                transaction,
                balance: user.green_credits,
            })
        })?;

        tracing::info!(
            actor_id,
            user_id,
            amount,
            balance = adjustment.balance,
            "Green credits adjusted"
        );
        Ok(adjustment)
    }

    /// Compare a user's cached balance with the ledger sum.
    pub fn reconcile(&self, user_id: &str) -> LedgerResult<Reconciliation> {
        let (cached_balance, ledger_balance) = self.store.read(|tx| -> LedgerResult<_> {
            let user = UserRepository::new(tx).get(user_id)?;
            let sum = CreditRepository::new(tx).sum_for_user(user_id)?;
            Ok((user.green_credits, sum))
        })?;

        if cached_balance != ledger_balance {
            tracing::error!(
                user_id,
                cached_balance,
                ledger_balance,
                "Balance does not match ledger"
            );
        }

        Ok(Reconciliation {
            user_id: user_id.to_string(),
            cached_balance,
            ledger_balance,
            consistent: cached_balance == ledger_balance,
        })
    }
}

// =============================================================================
// Balance primitive
// =============================================================================

/// A ledger row about to be appended.
pub(crate) struct LedgerEntry {
    amount: i64,
    kind: TransactionType,
    certificate: Option<String>,
    listing: Option<String>,
    reverses: Option<String>,
    description: Option<String>,
}

impl LedgerEntry {
    pub(crate) fn new(amount: i64, kind: TransactionType) -> Self {
        Self {
            amount,
            kind,
            certificate: None,
            listing: None,
            reverses: None,
            description: None,
        }
    }

    pub(crate) fn certificate(mut self, id: &str) -> Self {
        self.certificate = Some(id.to_string());
        self
    }

    pub(crate) fn listing(mut self, id: Option<&str>) -> Self {
        self.listing = id.map(str::to_string);
        self
    }

    pub(crate) fn reverses(mut self, id: &str) -> Self {
        self.reverses = Some(id.to_string());
        self
    }

    pub(crate) fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Apply `entry` to `user`'s balance and append the ledger row.
///
/// Fails with `InsufficientCredits` when the balance would go negative.
/// Persists the updated user record.
pub(crate) fn append_entry(
    tx: &Writer,
    user: &mut StoredUser,
    entry: LedgerEntry,
) -> LedgerResult<StoredCreditTransaction> {
    let balance = user
        .green_credits
        .checked_add(entry.amount)
        .ok_or_else(|| LedgerError::invalid("amount", "Amount is out of range."))?;
    if balance < 0 {
        return Err(LedgerError::InsufficientCredits {
            required: -entry.amount,
            available: user.green_credits,
        });
    }

    let now = Utc::now();
    user.green_credits = balance;
    user.updated_at = now;
    UserRepository::new(tx).update(user)?;

    let row = StoredCreditTransaction {
        id: new_id(),
        user_id: user.id.clone(),
        amount: entry.amount,
        transaction_type: entry.kind,
        certificate: entry.certificate,
        listing: entry.listing,
        reverses: entry.reverses,
        description: entry.description,
        transaction_time: now,
    };
    CreditRepository::new(tx).append(&row)?;
    Ok(row)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Ledger fixtures shared by the operation tests.

    use super::*;
    use crate::storage::repository::fixtures;

    pub fn ledger() -> (Ledger, tempfile::TempDir) {
        let (store, dir) = fixtures::temp_store();
        (Ledger::new(Arc::new(store), LedgerPolicy::default()), dir)
    }

    pub fn registered(ledger: &Ledger, email: &str) -> StoredUser {
        ledger.register(fixtures::user(email)).unwrap()
    }

    /// Assert the balance invariant for a user.
    pub fn assert_balanced(ledger: &Ledger, user_id: &str) {
        let report = ledger.reconcile(user_id).unwrap();
        assert!(report.consistent, "{report:?}");
        assert!(report.cached_balance >= 0);
    }

    pub fn store(ledger: &Ledger) -> &Store {
        &ledger.store
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::storage::repository::fixtures;

    #[test]
    fn registration_grants_three_wipes_and_thirty_credits() {
        let (ledger, _dir) = ledger();
        let user = registered(&ledger, "new@example.com");

        assert_eq!(user.wipes_remaining, 3);
        assert_eq!(user.green_credits, 30);

        let rows = store(&ledger)
            .read(|r| CreditRepository::new(r).list_for_user(&user.id))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].transaction_type, TransactionType::AwardedWipe);
        assert_eq!(rows[0].amount, 30);
        assert_eq!(
            rows[0].description.as_deref(),
            Some("Initial 30 green credits awarded for 3 free wipes on registration.")
        );
        assert_balanced(&ledger, &user.id);
    }

    #[test]
    fn superusers_get_no_grant() {
        let (ledger, _dir) = ledger();
        let mut admin = fixtures::user("root@example.com");
        admin.is_superuser = true;
        admin.is_staff = true;
        let admin = ledger.register(admin).unwrap();

        assert_eq!(admin.wipes_remaining, 0);
        assert_eq!(admin.green_credits, 0);
        let rows = store(&ledger)
            .read(|r| CreditRepository::new(r).list_for_user(&admin.id))
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn failed_registration_writes_nothing() {
        let (ledger, _dir) = ledger();
        registered(&ledger, "taken@example.com");

        let result = ledger.register(fixtures::user("taken@example.com"));
        assert!(matches!(result, Err(LedgerError::Store(_))));

        let rows = store(&ledger)
            .read(|r| CreditRepository::new(r).list())
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn adjustment_cannot_drive_balance_negative() {
        let (ledger, _dir) = ledger();
        let user = registered(&ledger, "adj@example.com");

        let result = ledger.admin_adjust("admin", &user.id, -31, Some("too much"), None);
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientCredits {
                required: 31,
                available: 30
            })
        ));

        let adjustment = ledger
            .admin_adjust("admin", &user.id, -30, Some("clawback"), Some("127.0.0.1"))
            .unwrap();
        assert_eq!(adjustment.balance, 0);
        assert_eq!(adjustment.transaction.transaction_type, TransactionType::AdminAdjustment);

        let actions = store(&ledger)
            .read(|r| AdminActionRepository::new(r).list())
            .unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].target_id.as_deref(), Some(user.id.as_str()));
        assert_balanced(&ledger, &user.id);
    }

    #[test]
    fn zero_adjustment_is_rejected() {
        let (ledger, _dir) = ledger();
        let user = registered(&ledger, "zero@example.com");
        let result = ledger.admin_adjust("admin", &user.id, 0, None, None);
        assert!(matches!(result, Err(LedgerError::Validation(_))));
    }

    #[test]
    fn reconcile_reports_agreement() {
        let (ledger, _dir) = ledger();
        let user = registered(&ledger, "rec@example.com");
        ledger.admin_adjust("admin", &user.id, 12, None, None).unwrap();

        let report = ledger.reconcile(&user.id).unwrap();
        assert_eq!(report.cached_balance, 42);
        assert_eq!(report.ledger_balance, 42);
        assert!(report.consistent);
    }
}
