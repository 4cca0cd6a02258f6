// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Green-credit ledger rows.
//!
//! Rows are append-only: there is no update or delete. The balance cached
//! on the user record is maintained by the ledger service in the same
//! transaction as each append.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::database::{EntityTable, ReadTables, Record, Writer, CREDIT_TRANSACTIONS};
use super::super::StorageResult;
use super::require;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    AwardedWipe,
    RedeemedPurchase,
    AdminAdjustment,
    Refund,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredCreditTransaction {
    pub id: String,
    pub user_id: String,
    /// Signed amount: positive credits, negative debits
    pub amount: i64,
    pub transaction_type: TransactionType,
    /// Certificate whose wipe earned the award
    pub certificate: Option<String>,
    /// Listing bought (or refunded)
    pub listing: Option<String>,
    /// Redemption reversed by a refund row
    pub reverses: Option<String>,
    pub description: Option<String>,
    pub transaction_time: DateTime<Utc>,
}

impl Record for StoredCreditTransaction {
    const TABLE: EntityTable = CREDIT_TRANSACTIONS;
    const KIND: &'static str = "green_credit_transaction";

    fn id(&self) -> &str {
        &self.id
    }
}

impl super::super::OwnedResource for StoredCreditTransaction {
    const RESOURCE: crate::auth::Resource = crate::auth::Resource::GreenCreditTransaction;

    fn owner_user_id(&self) -> &str {
        &self.user_id
    }
}

pub struct CreditRepository<'a, S> {
    tx: &'a S,
}

impl<'a, S: ReadTables> CreditRepository<'a, S> {
    pub fn new(tx: &'a S) -> Self {
        Self { tx }
    }

    pub fn get(&self, id: &str) -> StorageResult<StoredCreditTransaction> {
        require(self.tx, id)
    }

    /// Every row, most recent first.
    pub fn list(&self) -> StorageResult<Vec<StoredCreditTransaction>> {
        let mut rows: Vec<StoredCreditTransaction> = self.tx.scan()?;
        rows.sort_by(|a, b| b.transaction_time.cmp(&a.transaction_time));
        Ok(rows)
    }

    /// One user's rows, most recent first.
    pub fn list_for_user(&self, user_id: &str) -> StorageResult<Vec<StoredCreditTransaction>> {
        let mut rows = self
            .tx
            .filter(|t: &StoredCreditTransaction| t.user_id == user_id)?;
        rows.sort_by(|a, b| b.transaction_time.cmp(&a.transaction_time));
        Ok(rows)
    }

    /// Sum of a user's rows.
    pub fn sum_for_user(&self, user_id: &str) -> StorageResult<i64> {
        Ok(self
            .tx
            .filter(|t: &StoredCreditTransaction| t.user_id == user_id)?
            .iter()
            .map(|t| t.amount)
            .sum())
    }

    /// The wipe award already granted for a certificate, if any.
    pub fn find_award_for_certificate(
        &self,
        certificate_id: &str,
    ) -> StorageResult<Option<StoredCreditTransaction>> {
        Ok(self
            .tx
            .filter(|t: &StoredCreditTransaction| {
                t.transaction_type == TransactionType::AwardedWipe
                    && t.certificate.as_deref() == Some(certificate_id)
            })?
            .into_iter()
            .next())
    }

    /// The refund reversing a redemption, if any.
    pub fn find_refund_of(
        &self,
        transaction_id: &str,
    ) -> StorageResult<Option<StoredCreditTransaction>> {
        Ok(self
            .tx
            .filter(|t: &StoredCreditTransaction| t.reverses.as_deref() == Some(transaction_id))?
            .into_iter()
            .next())
    }
}

impl CreditRepository<'_, Writer> {
    /// Append a ledger row.
    pub fn append(&self, row: &StoredCreditTransaction) -> StorageResult<()> {
        self.tx.put(row)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::repository::fixtures::temp_store;
    use crate::storage::repository::new_id;
    use crate::storage::StorageError;

    fn row(user_id: &str, amount: i64, kind: TransactionType) -> StoredCreditTransaction {
        StoredCreditTransaction {
            id: new_id(),
            user_id: user_id.to_string(),
            amount,
            transaction_type: kind,
            certificate: None,
            listing: None,
            reverses: None,
            description: None,
            transaction_time: Utc::now(),
        }
    }

    #[test]
    fn sums_are_per_user() {
        let (store, _dir) = temp_store();
        store
            .write(|w| {
                let repo = CreditRepository::new(w);
                repo.append(&row("u1", 30, TransactionType::AwardedWipe))?;
                repo.append(&row("u1", -12, TransactionType::RedeemedPurchase))?;
                repo.append(&row("u2", 5, TransactionType::Other))?;
                Ok::<_, StorageError>(())
            })
            .unwrap();

        let (u1, u2, rows) = store
            .read(|r| {
                let repo = CreditRepository::new(r);
                Ok::<_, StorageError>((
                    repo.sum_for_user("u1")?,
                    repo.sum_for_user("u2")?,
                    repo.list_for_user("u1")?,
                ))
            })
            .unwrap();
        assert_eq!(u1, 18);
        assert_eq!(u2, 5);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn finds_award_and_refund_links() {
        let (store, _dir) = temp_store();
        let mut award = row("u1", 20, TransactionType::AwardedWipe);
        award.certificate = Some("cert-1".to_string());
        let redemption = row("u1", -20, TransactionType::RedeemedPurchase);
        let mut refund = row("u1", 20, TransactionType::Refund);
        refund.reverses = Some(redemption.id.clone());

        store
            .write(|w| {
                let repo = CreditRepository::new(w);
                repo.append(&award)?;
                repo.append(&redemption)?;
                repo.append(&refund)
            })
            .unwrap();

        store
            .read(|r| {
                let repo = CreditRepository::new(r);
                assert_eq!(repo.find_award_for_certificate("cert-1")?.map(|t| t.id), Some(award.id.clone()));
                assert!(repo.find_award_for_certificate("cert-2")?.is_none());
                assert_eq!(repo.find_refund_of(&redemption.id)?.map(|t| t.id), Some(refund.id.clone()));
                Ok::<_, StorageError>(())
            })
            .unwrap();
    }
}
