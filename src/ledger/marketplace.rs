// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Spending credits on listings, and reversing those purchases.

use super::{append_entry, Ledger, LedgerEntry, LedgerError, LedgerResult};
use crate::storage::Writer;
use crate::storage::repository::{
    AdminActionRepository, CertificateRepository, CreditRepository, ListingRepository,
    ListingStatus, StoredAdminAction, StoredCreditTransaction, StoredListing, TransactionType,
    UserRepository,
};
use crate::storage::StorageError;

/// Result of a successful redemption.
#[derive(Debug, Clone)]
pub struct Redemption {
    pub transaction: StoredCreditTransaction,
    pub listing: StoredListing,
    /// Buyer's balance after the debit
    pub balance: i64,
}

/// Result of a refunded redemption.
#[derive(Debug, Clone)]
pub struct Refund {
    pub transaction: StoredCreditTransaction,
    pub listing: Option<StoredListing>,
    pub balance: i64,
}

impl Ledger {
    /// Buy a listing with green credits.
    ///
    /// Checks run in this order: redeemability, availability, balance. The
    /// debit and the listing's move to `sold` commit together.
    pub fn redeem(&self, buyer_id: &str, listing_id: &str) -> LedgerResult<Redemption> {
        let redemption = self.store.write(|tx| -> LedgerResult<_> {
            let listing = ListingRepository::new(tx).get(listing_id)?;
            let price = match listing.green_credit_price {
                Some(price) if listing.is_redeemable_with_green_credits && price > 0 => price,
                _ => return Err(LedgerError::NotRedeemable(listing.id)),
            };
            if listing.status != ListingStatus::Active {
                return Err(LedgerError::ListingUnavailable {
                    listing_id: listing.id,
                    reason: "the listing is not active",
                });
            }
            if listing.user_id == buyer_id {
                return Err(LedgerError::ListingUnavailable {
                    listing_id: listing.id,
                    reason: "sellers cannot redeem their own listing",
                });
            }
            if certificate_invalidated(tx, &listing)? {
                return Err(LedgerError::ListingUnavailable {
                    listing_id: listing.id,
                    reason: "the listing's certificate has been invalidated",
                });
            }

            let mut buyer = UserRepository::new(tx).get(buyer_id)?;
            if price > buyer.green_credits {
                return Err(LedgerError::InsufficientCredits {
                    required: price,
                    available: buyer.green_credits,
                });
            }

            let transaction = append_entry(
                tx,
                &mut buyer,
                LedgerEntry::new(-price, TransactionType::RedeemedPurchase)
                    .listing(Some(&listing.id))
                    .describe(format!("Redeemed {price} green credits for \"{}\".", listing.title)),
            )?;

            let listing = ListingRepository::new(tx).set_status(&listing.id, ListingStatus::Sold)?;

            Ok(Redemption {
                transaction,
                listing,
                balance: buyer.green_credits,
            })
        })?;

        tracing::info!(
            buyer_id,
            listing_id,
            amount = redemption.transaction.amount,
            balance = redemption.balance,
            "Green credits redeemed"
        );
        Ok(redemption)
    }

    /// Reverse a redemption: credit the buyer back and return the listing
    /// to the market. Each redemption can be refunded once.
    pub fn refund(
        &self,
        actor_id: &str,
        transaction_id: &str,
        reason: Option<&str>,
        ip: Option<&str>,
    ) -> LedgerResult<Refund> {
        let refund = self.store.write(|tx| -> LedgerResult<_> {
            let credits = CreditRepository::new(tx);
            let original = credits.get(transaction_id)?;
            if original.transaction_type != TransactionType::RedeemedPurchase {
                return Err(LedgerError::NotRefundable {
                    id: original.id,
                    reason: "only redemptions can be refunded",
                });
            }
            if credits.find_refund_of(&original.id)?.is_some() {
                return Err(LedgerError::NotRefundable {
                    id: original.id,
                    reason: "the redemption was already refunded",
                });
            }

            let mut buyer = UserRepository::new(tx).get(&original.user_id)?;
            let amount = -original.amount;
            let description = match reason {
                Some(reason) => format!("Refund of {amount} green credits: {reason}"),
                None => format!("Refund of {amount} green credits."),
            };
            let transaction = append_entry(
                tx,
                &mut buyer,
                LedgerEntry::new(amount, TransactionType::Refund)
                    .listing(original.listing.as_deref())
                    .reverses(&original.id)
                    .describe(description),
            )?;

            let listing = match original.listing.as_deref() {
                Some(listing_id) => relist(tx, listing_id)?,
                None => None,
            };

            AdminActionRepository::new(tx).record(
                &StoredAdminAction::new(actor_id, "refund_redemption")
                    .target("green_credit_transactions", &original.id)
                    .reason(reason)
                    .ip(ip),
            )?;

            Ok(Refund {
                transaction,
                listing,
                balance: buyer.green_credits,
            })
        })?;

        tracing::info!(
            actor_id,
            transaction_id,
            amount = refund.transaction.amount,
            "Redemption refunded"
        );
        Ok(refund)
    }
}

fn certificate_invalidated(tx: &Writer, listing: &StoredListing) -> LedgerResult<bool> {
    match listing.certificate.as_deref() {
        Some(cert_id) => match CertificateRepository::new(tx).get(cert_id) {
            Ok(cert) => Ok(cert.is_invalidated),
            Err(StorageError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        },
        None => Ok(false),
    }
}

/// Put a refunded listing back on the market. A listing whose certificate
/// was invalidated after the sale is withdrawn instead.
fn relist(tx: &Writer, listing_id: &str) -> LedgerResult<Option<StoredListing>> {
    let listings = ListingRepository::new(tx);
    let listing = match listings.get(listing_id) {
        Ok(listing) => listing,
        Err(StorageError::NotFound { .. }) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if listing.status != ListingStatus::Sold {
        return Ok(Some(listing));
    }

    let status = if certificate_invalidated(tx, &listing)? {
        ListingStatus::Withdrawn
    } else {
        ListingStatus::Active
    };
    Ok(Some(listings.set_status(listing_id, status)?))
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::storage::repository::fixtures::{certificate, listing};

    fn redeemable(ledger: &Ledger, seller_id: &str, price: i64) -> StoredListing {
        let mut item = listing(seller_id, "Refurbished phone");
        item.is_redeemable_with_green_credits = true;
        item.green_credit_price = Some(price);
        store(ledger)
            .write(|w| ListingRepository::new(w).create(&item))
            .unwrap();
        item
    }

    fn rows_for(ledger: &Ledger, user_id: &str) -> Vec<StoredCreditTransaction> {
        store(ledger)
            .read(|r| CreditRepository::new(r).list_for_user(user_id))
            .unwrap()
    }

    #[test]
    fn register_redeem_all_then_fail() {
        let (ledger, _dir) = ledger();
        let seller = registered(&ledger, "seller@example.com");
        let buyer = registered(&ledger, "buyer@example.com");

        let item = redeemable(&ledger, &seller.id, 30);
        let redemption = ledger.redeem(&buyer.id, &item.id).unwrap();
        assert_eq!(redemption.balance, 0);
        assert_eq!(redemption.transaction.amount, -30);
        assert_eq!(redemption.listing.status, ListingStatus::Sold);

        let debits: Vec<_> = rows_for(&ledger, &buyer.id)
            .into_iter()
            .filter(|t| t.transaction_type == TransactionType::RedeemedPurchase)
            .collect();
        assert_eq!(debits.len(), 1);
        assert_eq!(debits[0].amount, -30);

        let cheap = redeemable(&ledger, &seller.id, 1);
        let result = ledger.redeem(&buyer.id, &cheap.id);
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientCredits {
                required: 1,
                available: 0
            })
        ));
        assert_balanced(&ledger, &buyer.id);
    }

    #[test]
    fn insufficient_balance_changes_nothing() {
        let (ledger, _dir) = ledger();
        let seller = registered(&ledger, "seller@example.com");
        let buyer = registered(&ledger, "buyer@example.com");
        let item = redeemable(&ledger, &seller.id, 31);

        let result = ledger.redeem(&buyer.id, &item.id);
        assert!(matches!(result, Err(LedgerError::InsufficientCredits { .. })));

        assert_eq!(rows_for(&ledger, &buyer.id).len(), 1);
        let after = store(&ledger)
            .read(|r| ListingRepository::new(r).get(&item.id))
            .unwrap();
        assert_eq!(after.status, ListingStatus::Active);
        assert_balanced(&ledger, &buyer.id);
    }

    #[test]
    fn non_redeemable_listing_always_fails() {
        let (ledger, _dir) = ledger();
        let seller = registered(&ledger, "seller@example.com");
        let buyer = registered(&ledger, "buyer@example.com");
        ledger.admin_adjust("admin", &buyer.id, 1_000, None, None).unwrap();

        let item = listing(&seller.id, "Cash only");
        store(&ledger)
            .write(|w| ListingRepository::new(w).create(&item))
            .unwrap();

        let result = ledger.redeem(&buyer.id, &item.id);
        assert!(matches!(result, Err(LedgerError::NotRedeemable(_))));
    }

    #[test]
    fn sold_or_own_listing_is_unavailable() {
        let (ledger, _dir) = ledger();
        let seller = registered(&ledger, "seller@example.com");
        let buyer = registered(&ledger, "buyer@example.com");
        let item = redeemable(&ledger, &seller.id, 10);

        assert!(matches!(
            ledger.redeem(&seller.id, &item.id),
            Err(LedgerError::ListingUnavailable { .. })
        ));

        ledger.redeem(&buyer.id, &item.id).unwrap();
        assert!(matches!(
            ledger.redeem(&buyer.id, &item.id),
            Err(LedgerError::ListingUnavailable { .. })
        ));
    }

    #[test]
    fn concurrent_redemptions_never_overdraw() {
        let (ledger, _dir) = ledger();
        let seller = registered(&ledger, "seller@example.com");
        let buyer = registered(&ledger, "buyer@example.com");

        // 30 credits, ten listings at 7 each: at most four can succeed
        let items: Vec<_> = (0..10).map(|_| redeemable(&ledger, &seller.id, 7)).collect();

        let handles: Vec<_> = items
            .into_iter()
            .map(|item| {
                let ledger = ledger.clone();
                let buyer_id = buyer.id.clone();
                std::thread::spawn(move || ledger.redeem(&buyer_id, &item.id).is_ok())
            })
            .collect();
        let succeeded = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(succeeded, 4);
        let report = ledger.reconcile(&buyer.id).unwrap();
        assert_eq!(report.cached_balance, 2);
        assert!(report.consistent);
    }

    #[test]
    fn refund_reverses_once_and_relists() {
        let (ledger, _dir) = ledger();
        let seller = registered(&ledger, "seller@example.com");
        let buyer = registered(&ledger, "buyer@example.com");
        let item = redeemable(&ledger, &seller.id, 25);
        let redemption = ledger.redeem(&buyer.id, &item.id).unwrap();

        let refund = ledger
            .refund("staff-1", &redemption.transaction.id, Some("damaged"), None)
            .unwrap();
        assert_eq!(refund.transaction.amount, 25);
        assert_eq!(refund.transaction.reverses.as_deref(), Some(redemption.transaction.id.as_str()));
        assert_eq!(refund.balance, 30);
        assert_eq!(refund.listing.map(|l| l.status), Some(ListingStatus::Active));

        let again = ledger.refund("staff-1", &redemption.transaction.id, None, None);
        assert!(matches!(again, Err(LedgerError::NotRefundable { .. })));
        assert_balanced(&ledger, &buyer.id);
    }

    #[test]
    fn refund_after_certificate_invalidation_withdraws_listing() {
        let (ledger, _dir) = ledger();
        let seller = registered(&ledger, "seller@example.com");
        let buyer = registered(&ledger, "buyer@example.com");

        let cert = certificate(&seller.id, "SN-REFUND-1");
        let mut item = listing(&seller.id, "Wiped laptop");
        item.is_redeemable_with_green_credits = true;
        item.green_credit_price = Some(20);
        item.certificate = Some(cert.id.clone());
        store(&ledger)
            .write(|w| -> Result<_, StorageError> {
                CertificateRepository::new(w).create(&cert)?;
                ListingRepository::new(w).create(&item)
            })
            .unwrap();
        let redemption = ledger.redeem(&buyer.id, &item.id).unwrap();

        store(&ledger)
            .write(|w| {
                let repo = CertificateRepository::new(w);
                let mut cert = repo.get(&cert.id)?;
                cert.is_invalidated = true;
                repo.update(&cert)
            })
            .unwrap();

        let refund = ledger
            .refund("staff-1", &redemption.transaction.id, Some("bad wipe"), None)
            .unwrap();
        assert_eq!(refund.balance, 30);
        assert_eq!(refund.listing.map(|l| l.status), Some(ListingStatus::Withdrawn));
        assert_balanced(&ledger, &buyer.id);

        let other = registered(&ledger, "other@example.com");
        store(&ledger)
            .write(|w| ListingRepository::new(w).set_status(&item.id, ListingStatus::Active))
            .unwrap();
        assert!(matches!(
            ledger.redeem(&other.id, &item.id),
            Err(LedgerError::ListingUnavailable { .. })
        ));
    }

    #[test]
    fn only_redemptions_are_refundable() {
        let (ledger, _dir) = ledger();
        let user = registered(&ledger, "user@example.com");
        let award = rows_for(&ledger, &user.id).remove(0);

        let result = ledger.refund("staff-1", &award.id, None, None);
        assert!(matches!(result, Err(LedgerError::NotRefundable { .. })));

        let missing = ledger.refund("staff-1", "nope", None, None);
        assert!(matches!(
            missing,
            Err(LedgerError::Store(StorageError::NotFound { .. }))
        ));
    }
}
