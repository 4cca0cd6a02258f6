// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Append-only log of staff actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::database::{EntityTable, ReadTables, Record, Writer, ADMIN_ACTIONS};
use super::super::StorageResult;
use super::{check_length, check_required, new_id, require};
use crate::models::FieldErrors;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredAdminAction {
    pub id: String,
    /// Staff member who acted (None once the account is gone)
    pub admin_user: Option<String>,
    /// e.g. `adjust_credits`, `refund_redemption`, `deactivate_user`
    pub action_type: String,
    pub target_table: Option<String>,
    pub target_id: Option<String>,
    pub reason: Option<String>,
    pub ip_address: Option<String>,
    pub performed_at: DateTime<Utc>,
}

impl StoredAdminAction {
    /// Build an action performed now by `admin_user_id`.
    pub fn new(admin_user_id: &str, action_type: &str) -> Self {
        Self {
            id: new_id(),
            admin_user: Some(admin_user_id.to_string()),
            action_type: action_type.to_string(),
            target_table: None,
            target_id: None,
            reason: None,
            ip_address: None,
            performed_at: Utc::now(),
        }
    }

    pub fn target(mut self, table: &str, id: &str) -> Self {
        self.target_table = Some(table.to_string());
        self.target_id = Some(id.to_string());
        self
    }

    pub fn reason(mut self, reason: Option<&str>) -> Self {
        self.reason = reason.map(str::to_string);
        self
    }

    pub fn ip(mut self, ip: Option<&str>) -> Self {
        self.ip_address = ip.map(str::to_string);
        self
    }
}

impl Record for StoredAdminAction {
    const TABLE: EntityTable = ADMIN_ACTIONS;
    const KIND: &'static str = "admin_action";

    fn id(&self) -> &str {
        &self.id
    }
}

pub struct AdminActionRepository<'a, S> {
    tx: &'a S,
}

impl<'a, S: ReadTables> AdminActionRepository<'a, S> {
    pub fn new(tx: &'a S) -> Self {
        Self { tx }
    }

    pub fn get(&self, id: &str) -> StorageResult<StoredAdminAction> {
        require(self.tx, id)
    }

    /// All actions, most recent first.
    pub fn list(&self) -> StorageResult<Vec<StoredAdminAction>> {
        let mut actions: Vec<StoredAdminAction> = self.tx.scan()?;
        actions.sort_by(|a, b| b.performed_at.cmp(&a.performed_at));
        Ok(actions)
    }
}

impl AdminActionRepository<'_, Writer> {
    /// Append an action. Existing rows are never modified.
    pub fn record(&self, action: &StoredAdminAction) -> StorageResult<()> {
        let mut errors = FieldErrors::default();
        check_required(&mut errors, "action_type", &action.action_type, 100);
        check_length(&mut errors, "target_table", action.target_table.as_deref(), 100);
        check_length(&mut errors, "target_id", action.target_id.as_deref(), 255);
        if let Some(ip) = action.ip_address.as_deref() {
            if ip.parse::<std::net::IpAddr>().is_err() {
                errors.add("ip_address", "Enter a valid IPv4 or IPv6 address.");
            }
        }
        errors.into_result()?;

        self.tx.put(action)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::repository::fixtures::temp_store;
    use crate::storage::StorageError;

    #[test]
    fn record_and_list_newest_first() {
        let (store, _dir) = temp_store();
        let mut older = StoredAdminAction::new("admin-1", "deactivate_user").target("users", "u-1");
        older.performed_at = Utc::now() - chrono::Duration::minutes(5);
        let newer = StoredAdminAction::new("admin-1", "adjust_credits")
            .target("users", "u-2")
            .reason(Some("goodwill"))
            .ip(Some("10.0.0.1"));

        store
            .write(|w| {
                let repo = AdminActionRepository::new(w);
                repo.record(&older)?;
                repo.record(&newer)
            })
            .unwrap();

        let actions = store.read(|r| AdminActionRepository::new(r).list()).unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].action_type, "adjust_credits");
        assert_eq!(actions[0].reason.as_deref(), Some("goodwill"));
    }

    #[test]
    fn invalid_ip_is_rejected() {
        let (store, _dir) = temp_store();
        let action = StoredAdminAction::new("admin-1", "noop").ip(Some("not-an-ip"));
        let result = store.write(|w| AdminActionRepository::new(w).record(&action));
        assert!(matches!(result, Err(StorageError::Validation(_))));
    }
}
