// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Credit and allowance constants injected into the ledger.

use serde::{Deserialize, Serialize};

/// Business constants for credit awards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPolicy {
    /// Wipes granted to every new non-superuser account
    pub free_wipes_on_registration: u32,
    /// Credits per free wipe granted on registration
    pub green_credits_per_free_wipe: i64,
    /// Credits awarded when a certified wipe completes
    pub green_credits_per_paid_wipe: i64,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            free_wipes_on_registration: 3,
            green_credits_per_free_wipe: 10,
            green_credits_per_paid_wipe: 20,
        }
    }
}

impl LedgerPolicy {
    /// Credits granted on registration.
    pub fn registration_credits(&self) -> i64 {
        i64::from(self.free_wipes_on_registration) * self.green_credits_per_free_wipe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registration_grant_is_thirty() {
        assert_eq!(LedgerPolicy::default().registration_credits(), 30);
    }
}
