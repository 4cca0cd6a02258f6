// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::AuthConfig;
use crate::ledger::{Ledger, LedgerPolicy};
use crate::storage::{AuditRepository, StoragePaths, Store};

/// Shared handles passed to every request handler.
#[derive(Clone)]
pub struct AppState {
    /// Entity database
    pub store: Arc<Store>,
    /// Balance and allowance service over the same database
    pub ledger: Ledger,
    /// Token signing and password hashing settings
    pub auth_config: Arc<AuthConfig>,
    /// Data directory layout
    pub paths: StoragePaths,
}

impl AppState {
    pub fn new(store: Store, paths: StoragePaths, auth_config: AuthConfig, policy: LedgerPolicy) -> Self {
        let store = Arc::new(store);
        Self {
            ledger: Ledger::new(Arc::clone(&store), policy),
            store,
            auth_config: Arc::new(auth_config),
            paths,
        }
    }

    /// Audit log writer for this data directory.
    pub fn audit(&self) -> AuditRepository<'_> {
        AuditRepository::new(&self.paths)
    }
}
