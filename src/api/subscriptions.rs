// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User subscription endpoints.
//!
//! Creating a subscription is a purchase: the package becomes the user's
//! current one. Its credits are awarded only for purchases staff record.
//! Status changes go through the ledger's transition rules; the remaining
//! fields are staff-maintained gateway data.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::extract::ValidatedJson;
use crate::{
    audit_log,
    auth::{list_scope, Action, Auth, Resource},
    error::{ApiError, ApiResult},
    ledger::{PurchaseRequest, SubscriptionPatch},
    models::ListParams,
    state::AppState,
    storage::{
        repository::{StoredSubscription, SubscriptionStatus},
        AuditEvent, AuditEventType, OwnershipEnforcer, SubscriptionRepository,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionResponse {
    pub id: String,
    pub user: String,
    pub package: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: SubscriptionStatus,
    /// 0 = unlimited
    pub initial_wipes_allocated: u32,
    pub wipes_used: u32,
    /// Wipes left, or null when unlimited
    pub wipes_left: Option<u32>,
    #[schema(value_type = Option<Object>)]
    pub payment_details: Option<Value>,
}

impl From<StoredSubscription> for SubscriptionResponse {
    fn from(s: StoredSubscription) -> Self {
        Self {
            wipes_left: s.wipes_left(),
            id: s.id,
            user: s.user_id,
            package: s.package,
            start_date: s.start_date,
            end_date: s.end_date,
            status: s.status,
            initial_wipes_allocated: s.initial_wipes_allocated,
            wipes_used: s.wipes_used,
            payment_details: s.payment_details,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubscriptionListResponse {
    pub subscriptions: Vec<SubscriptionResponse>,
    pub total: usize,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SubscriptionFilter {
    pub status: Option<SubscriptionStatus>,
    pub package: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct PurchaseSubscriptionRequest {
    pub package: String,
    /// Subscriber; defaults to the requester. Staff only when set to someone else.
    pub user: Option<String>,
    /// `active` (default) or `trial`
    pub status: Option<SubscriptionStatus>,
    pub end_date: Option<DateTime<Utc>>,
    /// Overrides the package allowance. Staff only.
    pub initial_wipes_allocated: Option<u32>,
    #[schema(value_type = Option<Object>)]
    pub payment_details: Option<Value>,
}

/// Partial update. `status` follows the transition rules; every other
/// field is staff only.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateSubscriptionRequest {
    pub status: Option<SubscriptionStatus>,
    #[serde(default, deserialize_with = "crate::models::nullable")]
    #[schema(value_type = Option<DateTime<Utc>>)]
    pub end_date: Option<Option<DateTime<Utc>>>,
    pub initial_wipes_allocated: Option<u32>,
    /// Never decreases
    pub wipes_used: Option<u32>,
    #[serde(default, deserialize_with = "crate::models::nullable")]
    #[schema(value_type = Option<Object>)]
    pub payment_details: Option<Option<Value>>,
}

impl From<UpdateSubscriptionRequest> for SubscriptionPatch {
    fn from(request: UpdateSubscriptionRequest) -> Self {
        Self {
            status: request.status,
            end_date: request.end_date,
            initial_wipes_allocated: request.initial_wipes_allocated,
            wipes_used: request.wipes_used,
            payment_details: request.payment_details,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/user-subscriptions",
    tag = "Subscriptions",
    security(("bearer_auth" = [])),
    params(SubscriptionFilter, ListParams),
    responses(
        (status = 200, description = "Subscriptions, newest first", body = SubscriptionListResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_subscriptions(
    Auth(user): Auth,
    State(state): State<AppState>,
    Query(filter): Query<SubscriptionFilter>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<SubscriptionListResponse>> {
    let scope = list_scope(Some(&user), Resource::UserSubscription)?;
    let subscriptions: Vec<_> = state
        .store
        .read(|r| SubscriptionRepository::new(r).list())?
        .into_iter()
        .filter(|s| scope.includes(&s.user_id))
        .filter(|s| filter.status.is_none_or(|st| s.status == st))
        .filter(|s| filter.package.as_ref().is_none_or(|p| &s.package == p))
        .collect();

    let (page, total) = params.paginate(subscriptions);
    Ok(Json(SubscriptionListResponse {
        subscriptions: page.into_iter().map(Into::into).collect(),
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/api/user-subscriptions/{id}",
    tag = "Subscriptions",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Subscription ID")),
    responses(
        (status = 200, description = "Subscription", body = SubscriptionResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody)
    )
)]
pub async fn get_subscription(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SubscriptionResponse>> {
    let subscription = state.store.read(|r| SubscriptionRepository::new(r).get(&id))?;
    subscription.authorize_for(Some(&user), Action::Retrieve)?;
    Ok(Json(subscription.into()))
}

/// Purchase a subscription package.
///
/// Package credits are awarded only when staff record an active purchase.
#[utoipa::path(
    post,
    path = "/api/user-subscriptions",
    tag = "Subscriptions",
    security(("bearer_auth" = [])),
    request_body = PurchaseSubscriptionRequest,
    responses(
        (status = 201, description = "Subscription created", body = SubscriptionResponse),
        (status = 400, description = "Invalid input or retired package", body = crate::error::ErrorBody),
        (status = 403, description = "Not permitted"),
        (status = 404, description = "Package not found", body = crate::error::ErrorBody)
    )
)]
pub async fn purchase_subscription(
    Auth(user): Auth,
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<PurchaseSubscriptionRequest>,
) -> ApiResult<(StatusCode, Json<SubscriptionResponse>)> {
    let subscriber = request.user.unwrap_or_else(|| user.user_id.clone());
    if !user.owns(&subscriber) && !user.is_staff() {
        return Err(ApiError::forbidden("Subscriptions can only be purchased for yourself"));
    }
    if request.initial_wipes_allocated.is_some() && !user.is_staff() {
        return Err(ApiError::forbidden("Only staff may override the wipe allowance"));
    }

    let subscription = state.ledger.purchase_subscription(PurchaseRequest {
        user_id: subscriber,
        package_id: request.package,
        status: request.status,
        end_date: request.end_date,
        initial_wipes_allocated: request.initial_wipes_allocated,
        payment_details: request.payment_details,
        recorded_by_staff: user.is_staff(),
    })?;

    state.audit().record(
        &AuditEvent::new(AuditEventType::SubscriptionPurchased)
            .with_user(&user.user_id)
            .with_resource("user_subscription", &subscription.id)
            .with_details(json!({
                "subscriber": subscription.user_id,
                "package": subscription.package,
                "initial_wipes_allocated": subscription.initial_wipes_allocated,
            })),
    );
    Ok((StatusCode::CREATED, Json(subscription.into())))
}

#[utoipa::path(
    patch,
    path = "/api/user-subscriptions/{id}",
    tag = "Subscriptions",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Subscription ID")),
    request_body = UpdateSubscriptionRequest,
    responses(
        (status = 200, description = "Subscription updated", body = SubscriptionResponse),
        (status = 400, description = "Invalid input", body = crate::error::ErrorBody),
        (status = 403, description = "Not permitted"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 422, description = "Status change not allowed", body = crate::error::ErrorBody)
    )
)]
pub async fn update_subscription(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(request): ValidatedJson<UpdateSubscriptionRequest>,
) -> ApiResult<Json<SubscriptionResponse>> {
    let existing = state.store.read(|r| SubscriptionRepository::new(r).get(&id))?;
    existing.authorize_for(Some(&user), Action::Update)?;

    let subscription = state
        .ledger
        .update_subscription(&id, request.into(), user.is_staff())?;

    audit_log!(state, AuditEventType::SubscriptionUpdated, user, "user_subscription", &id);
    Ok(Json(subscription.into()))
}

/// Delete a subscription that has ended.
#[utoipa::path(
    delete,
    path = "/api/user-subscriptions/{id}",
    tag = "Subscriptions",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Subscription ID")),
    responses(
        (status = 204, description = "Subscription deleted"),
        (status = 403, description = "Not permitted"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Still active or trial", body = crate::error::ErrorBody)
    )
)]
pub async fn delete_subscription(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.write(|w| -> ApiResult<_> {
        let repo = SubscriptionRepository::new(w);
        repo.get(&id)?.authorize_for(Some(&user), Action::Delete)?;
        repo.delete(&id)?;
        Ok(())
    })?;

    audit_log!(state, AuditEventType::SubscriptionDeleted, user, "user_subscription", &id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthenticatedUser, Role};
    use crate::models::Price;
    use crate::storage::repository::{new_id, StoredPackage, StoredUser};
    use crate::storage::{PackageRepository, UserRepository};
    use crate::test_support::{register_user, test_state};

    fn as_user(account: &StoredUser, role: Role) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: account.id.clone(),
            email: account.email.clone(),
            role,
            expires_at: 0,
        }
    }

    fn seed_package(state: &AppState, wipes_allowed: u32) -> String {
        let package = StoredPackage {
            id: new_id(),
            name: format!("Pro {wipes_allowed}"),
            description: None,
            wipes_allowed,
            green_credits_awarded: 25,
            price: Price::parse("49.00").unwrap(),
            is_active: true,
        };
        state
            .store
            .write(|w| PackageRepository::new(w).create(&package))
            .unwrap();
        package.id
    }

    fn purchase(package: &str) -> PurchaseSubscriptionRequest {
        PurchaseSubscriptionRequest {
            package: package.into(),
            user: None,
            status: None,
            end_date: None,
            initial_wipes_allocated: None,
            payment_details: Some(json!({ "gateway": "test", "ref": "abc" })),
        }
    }

    fn account(state: &AppState, id: &str) -> StoredUser {
        state.store.read(|r| UserRepository::new(r).get(id)).unwrap()
    }

    #[tokio::test]
    async fn staff_recorded_purchase_awards_credits() {
        let (state, _dir) = test_state();
        let alice = register_user(&state, "alice@example.com");
        let staff = register_user(&state, "staff@example.com");
        let package = seed_package(&state, 5);

        let mut request = purchase(&package);
        request.user = Some(alice.id.clone());
        let (status, Json(subscription)) = purchase_subscription(
            Auth(as_user(&staff, Role::Staff)),
            State(state.clone()),
            ValidatedJson(request),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(subscription.user, alice.id);
        assert_eq!(subscription.initial_wipes_allocated, 5);
        assert_eq!(subscription.wipes_left, Some(5));

        let account = account(&state, &alice.id);
        assert_eq!(account.green_credits, 55);
        assert_eq!(account.current_subscription_package.as_deref(), Some(package.as_str()));
    }

    #[tokio::test]
    async fn own_purchases_award_no_credits() {
        let (state, _dir) = test_state();
        let alice = register_user(&state, "alice@example.com");
        let package = seed_package(&state, 5);

        for _ in 0..4 {
            purchase_subscription(
                Auth(as_user(&alice, Role::Client)),
                State(state.clone()),
                ValidatedJson(purchase(&package)),
            )
            .await
            .unwrap();
        }

        let account = account(&state, &alice.id);
        assert_eq!(account.green_credits, 30);
        assert_eq!(account.current_subscription_package.as_deref(), Some(package.as_str()));
    }

    #[tokio::test]
    async fn clients_cannot_override_allowance() {
        let (state, _dir) = test_state();
        let alice = register_user(&state, "alice@example.com");
        let package = seed_package(&state, 5);

        let mut request = purchase(&package);
        request.initial_wipes_allocated = Some(0);
        let err = purchase_subscription(Auth(as_user(&alice, Role::Client)), State(state), ValidatedJson(request))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn owner_may_cancel_but_not_expire() {
        let (state, _dir) = test_state();
        let alice = register_user(&state, "alice@example.com");
        let package = seed_package(&state, 5);
        let (_, Json(subscription)) = purchase_subscription(
            Auth(as_user(&alice, Role::Client)),
            State(state.clone()),
            ValidatedJson(purchase(&package)),
        )
        .await
        .unwrap();

        let err = update_subscription(
            Auth(as_user(&alice, Role::Client)),
            State(state.clone()),
            Path(subscription.id.clone()),
            ValidatedJson(UpdateSubscriptionRequest {
                status: Some(SubscriptionStatus::Expired),
                ..Default::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        let err = delete_subscription(
            Auth(as_user(&alice, Role::Client)),
            State(state.clone()),
            Path(subscription.id.clone()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);

        let Json(cancelled) = update_subscription(
            Auth(as_user(&alice, Role::Client)),
            State(state.clone()),
            Path(subscription.id.clone()),
            ValidatedJson(UpdateSubscriptionRequest {
                status: Some(SubscriptionStatus::Cancelled),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
        assert!(cancelled.end_date.is_some());

        let err = update_subscription(
            Auth(as_user(&alice, Role::Client)),
            State(state.clone()),
            Path(subscription.id.clone()),
            ValidatedJson(UpdateSubscriptionRequest {
                status: Some(SubscriptionStatus::Active),
                ..Default::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, "invalid_transition");

        let status = delete_subscription(Auth(as_user(&alice, Role::Client)), State(state), Path(subscription.id))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn rejected_patch_changes_nothing() {
        let (state, _dir) = test_state();
        let alice = register_user(&state, "alice@example.com");
        let staff = register_user(&state, "staff@example.com");
        let package = seed_package(&state, 5);
        let (_, Json(subscription)) = purchase_subscription(
            Auth(as_user(&alice, Role::Client)),
            State(state.clone()),
            ValidatedJson(purchase(&package)),
        )
        .await
        .unwrap();
        state.ledger.consume_wipe(&subscription.id).unwrap();

        let err = update_subscription(
            Auth(as_user(&staff, Role::Staff)),
            State(state.clone()),
            Path(subscription.id.clone()),
            ValidatedJson(UpdateSubscriptionRequest {
                status: Some(SubscriptionStatus::Cancelled),
                wipes_used: Some(0),
                ..Default::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, "validation_error");

        let Json(after) = get_subscription(
            Auth(as_user(&alice, Role::Client)),
            State(state),
            Path(subscription.id),
        )
        .await
        .unwrap();
        assert_eq!(after.status, SubscriptionStatus::Active);
        assert_eq!(after.wipes_used, 1);
    }

    #[tokio::test]
    async fn wipes_used_never_decreases() {
        let (state, _dir) = test_state();
        let alice = register_user(&state, "alice@example.com");
        let staff = register_user(&state, "staff@example.com");
        let package = seed_package(&state, 5);
        let (_, Json(subscription)) = purchase_subscription(
            Auth(as_user(&alice, Role::Client)),
            State(state.clone()),
            ValidatedJson(purchase(&package)),
        )
        .await
        .unwrap();
        state.ledger.consume_wipe(&subscription.id).unwrap();

        let err = update_subscription(
            Auth(as_user(&staff, Role::Staff)),
            State(state),
            Path(subscription.id),
            ValidatedJson(UpdateSubscriptionRequest {
                wipes_used: Some(0),
                ..Default::default()
            }),
        )
        .await
        .unwrap_err();
        assert!(err.fields.unwrap().get("wipes_used").is_some());
    }
}
