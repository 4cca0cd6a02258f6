// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Certificate lifecycle and wipe allowances.
//!
//! - Creating a certificate against a subscription consumes one wipe of
//!   its allowance.
//! - A certificate reaching `success` awards credits once and uses up one
//!   of the owner's remaining wipes.

use chrono::Utc;

use super::{append_entry, Ledger, LedgerEntry, LedgerError, LedgerResult};
use crate::models::FieldErrors;
use crate::storage::repository::{
    CertificateRepository, CertificateStatus, CreditRepository, StoredCertificate,
    StoredSubscription, SubscriptionRepository, TransactionType, UserRepository,
};
use crate::storage::{StorageError, Writer};

impl Ledger {
    /// Store a new certificate, consuming subscription allowance and
    /// recording completion as needed.
    pub fn create_certificate(&self, certificate: StoredCertificate) -> LedgerResult<StoredCertificate> {
        let certificate = self.store.write(|tx| -> LedgerResult<_> {
            let mut certificate = certificate;
            if let Some(subscription_id) = certificate.user_subscription.clone() {
                let subscription = SubscriptionRepository::new(tx).get(&subscription_id)?;
                if subscription.user_id != certificate.user_id {
                    return Err(LedgerError::invalid(
                        "user_subscription",
                        "The subscription must belong to the certificate owner.",
                    ));
                }
                consume_in(tx, subscription)?;
            }

            CertificateRepository::new(tx).create(&certificate)?;
            if certificate.status == CertificateStatus::Success {
                self.complete_in(tx, &mut certificate)?;
            }
            Ok(certificate)
        })?;

        tracing::info!(
            certificate_id = %certificate.id,
            user_id = %certificate.user_id,
            status = ?certificate.status,
            "Certificate created"
        );
        Ok(certificate)
    }

    /// Replace a certificate with `updated`.
    ///
    /// Invalidated certificates are frozen. The serial number, owner and
    /// subscription never change, and status may only leave `pending`.
    pub fn update_certificate(&self, updated: StoredCertificate) -> LedgerResult<StoredCertificate> {
        let (certificate, completed) = self.store.write(|tx| -> LedgerResult<_> {
            let previous = CertificateRepository::new(tx).get(&updated.id)?;
            if previous.is_invalidated {
                return Err(LedgerError::CertificateInvalidated(previous.id));
            }

            let mut errors = FieldErrors::default();
            if updated.device_serial_number != previous.device_serial_number {
                errors.add("device_serial_number", "This field cannot be changed.");
            }
            if updated.user_id != previous.user_id {
                errors.add("user", "This field cannot be changed.");
            }
            if updated.user_subscription != previous.user_subscription {
                errors.add("user_subscription", "This field cannot be changed.");
            }
            errors.into_result()?;

            if updated.status != previous.status && previous.status.is_terminal() {
                return Err(LedgerError::transition(previous.status, updated.status));
            }

            let mut certificate = updated;
            let completed = previous.status != CertificateStatus::Success
                && certificate.status == CertificateStatus::Success;
            CertificateRepository::new(tx).update(&certificate)?;
            if completed {
                self.complete_in(tx, &mut certificate)?;
            }
            Ok((certificate, completed))
        })?;

        if completed {
            tracing::info!(
                certificate_id = %certificate.id,
                user_id = %certificate.user_id,
                "Wipe completed"
            );
        }
        Ok(certificate)
    }

    /// Delete a certificate that never completed.
    ///
    /// Successful certificates back a credit award and are kept.
    pub fn delete_certificate(&self, id: &str) -> LedgerResult<StoredCertificate> {
        let certificate = self.store.write(|tx| -> LedgerResult<_> {
            let certificate = CertificateRepository::new(tx).get(id)?;
            if certificate.status == CertificateStatus::Success {
                return Err(LedgerError::Store(StorageError::Protected {
                    resource: "certificate",
                    reason: "completed wipes are part of the credit history".to_string(),
                }));
            }
            Ok(CertificateRepository::new(tx).delete(id)?)
        })?;

        tracing::info!(certificate_id = %certificate.id, "Certificate deleted");
        Ok(certificate)
    }

    /// Consume one wipe from a subscription's allowance.
    pub fn consume_wipe(&self, subscription_id: &str) -> LedgerResult<StoredSubscription> {
        let subscription = self.store.write(|tx| -> LedgerResult<_> {
            let subscription = SubscriptionRepository::new(tx).get(subscription_id)?;
            consume_in(tx, subscription)
        })?;

        tracing::info!(
            subscription_id,
            wipes_used = subscription.wipes_used,
            allocated = subscription.initial_wipes_allocated,
            "Subscription wipe consumed"
        );
        Ok(subscription)
    }

    /// Record a completed wipe: stamp `completed_at`, use one remaining
    /// wipe and award credits. A certificate is awarded at most once.
    fn complete_in(&self, tx: &Writer, certificate: &mut StoredCertificate) -> LedgerResult<()> {
        if CreditRepository::new(tx)
            .find_award_for_certificate(&certificate.id)?
            .is_some()
        {
            return Ok(());
        }

        if certificate.completed_at.is_none() {
            certificate.completed_at = Some(Utc::now());
            CertificateRepository::new(tx).update(certificate)?;
        }

        let mut owner = UserRepository::new(tx).get(&certificate.user_id)?;
        owner.wipes_remaining = owner.wipes_remaining.saturating_sub(1);

        let credits = self.policy.green_credits_per_paid_wipe;
        if credits > 0 {
            append_entry(
                tx,
                &mut owner,
                LedgerEntry::new(credits, TransactionType::AwardedWipe)
                    .certificate(&certificate.id)
                    .describe(format!(
                        "Awarded {credits} green credits for certified wipe of device {}.",
                        certificate.device_serial_number
                    )),
            )?;
        } else {
            owner.updated_at = Utc::now();
            UserRepository::new(tx).update(&owner)?;
        }
        Ok(())
    }
}

/// Increment `wipes_used` if the subscription is live and has allowance.
fn consume_in(tx: &Writer, mut subscription: StoredSubscription) -> LedgerResult<StoredSubscription> {
    if !subscription.status.is_live() || subscription.has_ended(Utc::now()) {
        return Err(LedgerError::SubscriptionInactive(subscription.id));
    }
    if subscription.wipes_left() == Some(0) {
        return Err(LedgerError::AllowanceExhausted(subscription.id));
    }

    subscription.wipes_used += 1;
    SubscriptionRepository::new(tx).update(&subscription)?;
    Ok(subscription)
}
