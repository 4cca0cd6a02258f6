// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ownership enforcement for owned records.
//!
//! Records that belong to a user implement [`OwnedResource`]; handlers then
//! call [`OwnershipEnforcer::authorize_for`] so the per-object check always
//! goes through the one capability table in [`crate::auth::permissions`].

use crate::auth::{authorize, Action, AuthError, AuthenticatedUser, Resource};

/// Trait for resources that have an owner.
pub trait OwnedResource {
    /// Resource kind in the capability table.
    const RESOURCE: Resource;

    /// Get the owner's user ID.
    fn owner_user_id(&self) -> &str;
}

/// Trait for enforcing ownership on a loaded record.
pub trait OwnershipEnforcer {
    /// Verify that `user` may perform `action` on this record.
    ///
    /// # Errors
    /// Returns `AuthError::PermissionDenied` if the user is neither the owner
    /// nor staff (for owner-scoped actions).
    fn authorize_for(&self, user: Option<&AuthenticatedUser>, action: Action) -> Result<(), AuthError>;
}

impl<T: OwnedResource> OwnershipEnforcer for T {
    fn authorize_for(&self, user: Option<&AuthenticatedUser>, action: Action) -> Result<(), AuthError> {
        authorize(user, T::RESOURCE, action, Some(self.owner_user_id()))
    }
}
