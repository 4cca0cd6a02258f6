// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims and authenticated user representation.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::roles::Role;

/// Claims carried by an access token issued at login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the user's id.
    pub sub: String,
    /// Role at the time the token was issued.
    pub role: Role,
    /// Issuer.
    pub iss: String,
    /// Issued at (Unix seconds).
    pub iat: i64,
    /// Expiration (Unix seconds).
    pub exp: i64,
}

/// Authenticated user information.
///
/// This is the primary type used throughout the application to represent
/// the user making a request. The role is taken from the stored account,
/// not from the token, so staff changes take effect immediately.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedUser {
    /// Canonical user ID (token `sub` claim)
    pub user_id: String,

    /// Account email
    pub email: String,

    /// User's role
    pub role: Role,

    /// Token expiration (Unix timestamp, not serialized)
    #[serde(skip)]
    pub expires_at: i64,
}

impl AuthenticatedUser {
    /// Check if the user has the required role.
    pub fn has_role(&self, required: Role) -> bool {
        self.role.has_privilege(required)
    }

    /// Staff and admins bypass ownership checks.
    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    /// Check if this user is an admin.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether this user owns a record with the given owner id.
    pub fn owns(&self, owner_user_id: &str) -> bool {
        self.user_id == owner_user_id
    }
}
