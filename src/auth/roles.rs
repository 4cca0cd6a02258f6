// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User roles for authorization.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// User roles for authorization.
///
/// ## Role Hierarchy
///
/// - `Admin` - Superuser; everything staff can do plus granting staff rights
/// - `Staff` - Bypasses ownership checks and manages catalog entities
/// - `Client` - Normal user, can only access own records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full administrative access
    Admin,
    /// Platform staff
    Staff,
    /// Normal client user (least privilege)
    #[default]
    Client,
}

impl Role {
    /// Role for an account with the given flags.
    pub fn for_account(is_superuser: bool, is_staff: bool) -> Role {
        match (is_superuser, is_staff) {
            (true, _) => Role::Admin,
            (false, true) => Role::Staff,
            (false, false) => Role::Client,
        }
    }

    /// Check if this role has at least the privileges of the required role.
    pub fn has_privilege(&self, required: Role) -> bool {
        match (self, required) {
            (Role::Admin, _) => true,
            (Role::Staff, Role::Staff | Role::Client) => true,
            (Role::Client, Role::Client) => true,
            _ => false,
        }
    }

    /// Staff bypass ownership checks.
    pub fn is_staff(&self) -> bool {
        self.has_privilege(Role::Staff)
    }

    /// Parse role from string (case-insensitive).
    pub fn from_str(s: &str) -> Option<Role> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "staff" => Some(Role::Staff),
            "client" => Some(Role::Client),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Staff => write!(f, "staff"),
            Role::Client => write!(f, "client"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_has_all_privileges() {
        assert!(Role::Admin.has_privilege(Role::Admin));
        assert!(Role::Admin.has_privilege(Role::Staff));
        assert!(Role::Admin.has_privilege(Role::Client));
    }

    #[test]
    fn staff_is_not_admin() {
        assert!(!Role::Staff.has_privilege(Role::Admin));
        assert!(Role::Staff.has_privilege(Role::Staff));
        assert!(Role::Staff.is_staff());
    }

    #[test]
    fn client_only_has_client_privilege() {
        assert!(!Role::Client.has_privilege(Role::Admin));
        assert!(!Role::Client.has_privilege(Role::Staff));
        assert!(Role::Client.has_privilege(Role::Client));
        assert!(!Role::Client.is_staff());
    }

    #[test]
    fn role_follows_account_flags() {
        assert_eq!(Role::for_account(true, false), Role::Admin);
        assert_eq!(Role::for_account(false, true), Role::Staff);
        assert_eq!(Role::for_account(false, false), Role::Client);
    }

    #[test]
    fn from_str_parses_correctly() {
        assert_eq!(Role::from_str("admin"), Some(Role::Admin));
        assert_eq!(Role::from_str("STAFF"), Some(Role::Staff));
        assert_eq!(Role::from_str("Client"), Some(Role::Client));
        assert_eq!(Role::from_str("unknown"), None);
    }

    #[test]
    fn default_role_is_client() {
        assert_eq!(Role::default(), Role::Client);
    }
}
