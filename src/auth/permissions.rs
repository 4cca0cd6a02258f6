// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-resource, per-action capability table.
//!
//! Every handler asks [`authorize`] whether the requester may perform an
//! action, passing the owning user id of the record when one exists. List
//! endpoints use [`list_scope`] to restrict results to the requester's own
//! rows.
//!
//! | Resource | list / retrieve | create | update / delete |
//! |---|---|---|---|
//! | Category, SubscriptionPackage | public | staff | staff |
//! | Listing, ListingMedia | public | authenticated | owner or staff |
//! | User | staff / owner or staff | staff | owner or staff |
//! | Certificate, UserSubscription | owner or staff | authenticated | owner or staff |
//! | GreenCreditTransaction | owner or staff | never | never |
//! | AdminAction | staff | staff | never |

use super::{AuthError, AuthenticatedUser};

/// Resources guarded by the capability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    User,
    Category,
    Certificate,
    Listing,
    ListingMedia,
    AdminAction,
    SubscriptionPackage,
    UserSubscription,
    GreenCreditTransaction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Retrieve,
    Create,
    Update,
    Delete,
}

/// What a requester needs for an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Anyone, including anonymous callers
    Public,
    /// Any authenticated account
    Authenticated,
    /// The record's owner, or staff
    OwnerOrStaff,
    /// Staff only
    Staff,
    /// Nobody through the generic CRUD surface
    Never,
}

/// Capability required for `action` on `resource`.
pub fn capability(resource: Resource, action: Action) -> Capability {
    use Action::*;
    use Resource::*;

    match (resource, action) {
        (Category | SubscriptionPackage, List | Retrieve) => Capability::Public,
        (Category | SubscriptionPackage, _) => Capability::Staff,

        (Listing | ListingMedia, List | Retrieve) => Capability::Public,
        (Listing | ListingMedia, Create) => Capability::Authenticated,
        (Listing | ListingMedia, Update | Delete) => Capability::OwnerOrStaff,

        (User, List | Create) => Capability::Staff,
        (User, Retrieve | Update | Delete) => Capability::OwnerOrStaff,

        // Lists are filtered to the requester's rows by `list_scope`
        (Certificate | UserSubscription, List | Create) => Capability::Authenticated,
        (Certificate | UserSubscription, Retrieve | Update | Delete) => Capability::OwnerOrStaff,

        (GreenCreditTransaction, List) => Capability::Authenticated,
        (GreenCreditTransaction, Retrieve) => Capability::OwnerOrStaff,
        (GreenCreditTransaction, Create | Update | Delete) => Capability::Never,

        (AdminAction, List | Retrieve | Create) => Capability::Staff,
        (AdminAction, Update | Delete) => Capability::Never,
    }
}

/// Check whether `requester` may perform `action` on `resource`.
///
/// `owner_user_id` is the owning user of the target record; it is required
/// for owner-scoped checks and ignored otherwise. A missing owner denies
/// non-staff requesters.
pub fn authorize(
    requester: Option<&AuthenticatedUser>,
    resource: Resource,
    action: Action,
    owner_user_id: Option<&str>,
) -> Result<(), AuthError> {
    let required = capability(resource, action);
    if required == Capability::Public {
        return Ok(());
    }

    let user = requester.ok_or(AuthError::MissingAuthHeader)?;
    let allowed = match required {
        Capability::Public | Capability::Authenticated => true,
        Capability::OwnerOrStaff => {
            user.is_staff() || owner_user_id.is_some_and(|owner| user.owns(owner))
        }
        Capability::Staff => user.is_staff(),
        Capability::Never => false,
    };

    if allowed {
        Ok(())
    } else {
        tracing::debug!(
            user_id = %user.user_id,
            ?resource,
            ?action,
            "Permission denied"
        );
        Err(AuthError::PermissionDenied)
    }
}

/// Which rows a list request may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListScope {
    /// Every row
    All,
    /// Only rows owned by this user id
    Owner(String),
}

impl ListScope {
    /// Whether a row owned by `owner_user_id` is visible.
    pub fn includes(&self, owner_user_id: &str) -> bool {
        match self {
            ListScope::All => true,
            ListScope::Owner(id) => id == owner_user_id,
        }
    }
}

/// Authorize a list request and compute its row filter.
///
/// Public resources are unfiltered. Owner-scoped resources are filtered to
/// the requester's rows unless the requester is staff.
pub fn list_scope(
    requester: Option<&AuthenticatedUser>,
    resource: Resource,
) -> Result<ListScope, AuthError> {
    authorize(requester, resource, Action::List, None)?;

    let owner_scoped = matches!(
        resource,
        Resource::Certificate | Resource::UserSubscription | Resource::GreenCreditTransaction
    );
    match requester {
        Some(user) if owner_scoped && !user.is_staff() => Ok(ListScope::Owner(user.user_id.clone())),
        _ => Ok(ListScope::All),
    }
}
