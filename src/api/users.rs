// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User account endpoints.
//!
//! Accounts are never removed: `DELETE` deactivates. Balances and wipe
//! allowances are read-only here and only move through the ledger.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use validator::Validate;

use super::auth::{hash_password, new_account};
use super::credits::CreditTransactionResponse;
use super::extract::{ClientIp, ValidatedJson};
use crate::{
    audit_log,
    auth::{Action, Auth, AuthenticatedUser, StaffOnly},
    error::{ApiError, ApiResult},
    ledger::Reconciliation,
    models::ListParams,
    state::AppState,
    storage::{
        repository::{StoredAdminAction, StoredUser},
        AdminActionRepository, AuditEvent, AuditEventType, OwnershipEnforcer, StorageError,
        UserRepository,
    },
};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Account as returned to clients. The password hash is never included.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub username: Option<String>,
    pub phone_number: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub wipes_remaining: u32,
    pub green_credits: i64,
    pub current_subscription_package: Option<String>,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<StoredUser> for UserResponse {
    fn from(user: StoredUser) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            phone_number: user.phone_number,
            first_name: user.first_name,
            last_name: user.last_name,
            wipes_remaining: user.wipes_remaining,
            green_credits: user.green_credits,
            current_subscription_package: user.current_subscription_package,
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
            is_active: user.is_active,
            date_joined: user.date_joined,
            updated_at: user.updated_at,
            last_login: user.last_login,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserListResponse {
    pub users: Vec<UserResponse>,
    /// Total count before pagination
    pub total: usize,
}

/// Staff request to create an account.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    pub username: Option<String>,
    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters."))]
    pub password: String,
    pub phone_number: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    /// Admin only
    #[serde(default)]
    pub is_staff: bool,
}

/// Partial account update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateUserRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: Option<String>,
    /// `null` clears the username
    #[serde(default, deserialize_with = "crate::models::nullable")]
    #[schema(value_type = Option<String>)]
    pub username: Option<Option<String>>,
    /// `null` clears the phone number
    #[serde(default, deserialize_with = "crate::models::nullable")]
    #[schema(value_type = Option<String>)]
    pub phone_number: Option<Option<String>>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters."))]
    pub password: Option<String>,
    /// Staff only
    pub is_active: Option<bool>,
    /// Admin only
    pub is_staff: Option<bool>,
}

/// Staff balance adjustment.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AdjustCreditsRequest {
    /// Signed, non-zero number of credits
    pub amount: i64,
    #[validate(length(max = 1000, message = "Ensure this field has no more than 1000 characters."))]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdjustCreditsResponse {
    pub transaction: CreditTransactionResponse,
    /// Balance after the adjustment
    pub balance: i64,
}

// ============================================================================
// Handlers
// ============================================================================

/// List all accounts. Staff only.
#[utoipa::path(
    get,
    path = "/api/users",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(ListParams),
    responses(
        (status = 200, description = "Accounts", body = UserListResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Staff required")
    )
)]
pub async fn list_users(
    StaffOnly(_user): StaffOnly,
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<UserListResponse>> {
    let users = state.store.read(|r| UserRepository::new(r).list())?;
    let (page, total) = params.paginate(users);
    Ok(Json(UserListResponse {
        users: page.into_iter().map(UserResponse::from).collect(),
        total,
    }))
}

/// Create an account on someone's behalf. Staff only.
///
/// The account receives the same registration allowance as a self-service
/// signup. Only admins may create staff accounts.
#[utoipa::path(
    post,
    path = "/api/users",
    tag = "Users",
    security(("bearer_auth" = [])),
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Account created", body = UserResponse),
        (status = 400, description = "Invalid input", body = crate::error::ErrorBody),
        (status = 403, description = "Staff required")
    )
)]
pub async fn create_user(
    StaffOnly(user): StaffOnly,
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    if request.is_staff && !user.is_admin() {
        return Err(ApiError::forbidden("Only admins may grant staff status"));
    }

    let password_hash = hash_password(&state, request.password).await?;
    let mut account = new_account(
        &request.email,
        request.username,
        request.phone_number,
        request.first_name,
        request.last_name,
        password_hash,
    );
    account.is_staff = request.is_staff;
    let account = state.ledger.register(account)?;

    audit_log!(state, AuditEventType::UserRegistered, user, "user", &account.id);
    Ok((StatusCode::CREATED, Json(UserResponse::from(account))))
}

/// Get one account. Owner or staff.
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "Account", body = UserResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody)
    )
)]
pub async fn get_user(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<UserResponse>> {
    let account = state.store.read(|r| UserRepository::new(r).get(&id))?;
    account.authorize_for(Some(&user), Action::Retrieve)?;
    Ok(Json(UserResponse::from(account)))
}

/// Check the privileged parts of an update against the requester.
fn check_privileged_fields(user: &AuthenticatedUser, request: &UpdateUserRequest) -> ApiResult<()> {
    if request.is_active.is_some() && !user.is_staff() {
        return Err(ApiError::forbidden("Only staff may change is_active"));
    }
    if request.is_staff.is_some() && !user.is_admin() {
        return Err(ApiError::forbidden("Only admins may change is_staff"));
    }
    Ok(())
}

/// Staff and superuser accounts may only be managed by themselves or an admin.
fn check_privileged_target(user: &AuthenticatedUser, target: &StoredUser) -> ApiResult<()> {
    if (target.is_staff || target.is_superuser) && !user.owns(&target.id) && !user.is_admin() {
        return Err(ApiError::forbidden("Only admins may manage staff accounts"));
    }
    Ok(())
}

/// Update an account. Owner or staff.
#[utoipa::path(
    patch,
    path = "/api/users/{id}",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated account", body = UserResponse),
        (status = 400, description = "Invalid input", body = crate::error::ErrorBody),
        (status = 403, description = "Not permitted"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody)
    )
)]
pub async fn update_user(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(request): ValidatedJson<UpdateUserRequest>,
) -> ApiResult<Json<UserResponse>> {
    let existing = state.store.read(|r| UserRepository::new(r).get(&id))?;
    existing.authorize_for(Some(&user), Action::Update)?;
    check_privileged_target(&user, &existing)?;
    check_privileged_fields(&user, &request)?;

    let password_hash = match request.password {
        Some(password) => Some(hash_password(&state, password).await?),
        None => None,
    };

    let account = state.store.write(|w| -> Result<_, StorageError> {
        let repo = UserRepository::new(w);
        let mut account = repo.get(&id)?;
        if let Some(email) = &request.email {
            account.email = email.clone();
        }
        if let Some(username) = &request.username {
            account.username = username.clone();
        }
        if let Some(phone_number) = &request.phone_number {
            account.phone_number = phone_number.clone();
        }
        if let Some(first_name) = &request.first_name {
            account.first_name = first_name.clone();
        }
        if let Some(last_name) = &request.last_name {
            account.last_name = last_name.clone();
        }
        if let Some(hash) = &password_hash {
            account.password_hash = hash.clone();
        }
        if let Some(is_active) = request.is_active {
            account.is_active = is_active;
        }
        if let Some(is_staff) = request.is_staff {
            account.is_staff = is_staff;
        }
        account.updated_at = Utc::now();
        repo.update(&account)?;
        Ok(repo.get(&id)?)
    })?;

    state.audit().record(
        &AuditEvent::new(AuditEventType::UserUpdated)
            .with_user(&user.user_id)
            .with_resource("user", &account.id)
            .with_details(json!({
                "password_changed": password_hash.is_some(),
                "is_active": request.is_active,
                "is_staff": request.is_staff,
            })),
    );
    Ok(Json(UserResponse::from(account)))
}

/// Deactivate an account. Owner or staff; staff accounts need an admin.
///
/// Staff deactivating someone else's account leave an admin action row.
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "User ID")),
    responses(
        (status = 204, description = "Account deactivated"),
        (status = 403, description = "Not permitted"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody)
    )
)]
pub async fn delete_user(
    Auth(user): Auth,
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let existing = state.store.read(|r| UserRepository::new(r).get(&id))?;
    existing.authorize_for(Some(&user), Action::Delete)?;
    check_privileged_target(&user, &existing)?;

    state.store.write(|w| -> Result<_, StorageError> {
        UserRepository::new(w).deactivate(&id)?;
        if !user.owns(&id) {
            AdminActionRepository::new(w).record(
                &StoredAdminAction::new(&user.user_id, "deactivate_user")
                    .target("users", &id)
                    .ip(ip.as_deref()),
            )?;
        }
        Ok(())
    })?;

    tracing::info!(actor_id = %user.user_id, user_id = %id, "Account deactivated");
    audit_log!(state, AuditEventType::UserDeactivated, user, "user", &id);
    Ok(StatusCode::NO_CONTENT)
}

/// Apply a signed credit adjustment. Staff only.
///
/// The resulting balance may not be negative.
#[utoipa::path(
    post,
    path = "/api/users/{id}/adjust-credits",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "User ID")),
    request_body = AdjustCreditsRequest,
    responses(
        (status = 200, description = "Balance adjusted", body = AdjustCreditsResponse),
        (status = 400, description = "Zero amount", body = crate::error::ErrorBody),
        (status = 403, description = "Staff required"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 422, description = "Balance would go negative", body = crate::error::ErrorBody)
    )
)]
pub async fn adjust_credits(
    StaffOnly(user): StaffOnly,
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
    ValidatedJson(request): ValidatedJson<AdjustCreditsRequest>,
) -> ApiResult<Json<AdjustCreditsResponse>> {
    let adjustment = state.ledger.admin_adjust(
        &user.user_id,
        &id,
        request.amount,
        request.reason.as_deref(),
        ip.as_deref(),
    )?;

    state.audit().record(
        &AuditEvent::new(AuditEventType::CreditsAdjusted)
            .with_user(&user.user_id)
            .with_resource("user", &id)
            .with_ip(ip.as_deref())
            .with_details(json!({
                "amount": request.amount,
                "balance": adjustment.balance,
                "transaction_id": adjustment.transaction.id,
            })),
    );

    Ok(Json(AdjustCreditsResponse {
        transaction: adjustment.transaction.into(),
        balance: adjustment.balance,
    }))
}

/// Compare the cached balance with the ledger sum. Owner or staff.
#[utoipa::path(
    get,
    path = "/api/users/{id}/balance",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "Balance reconciliation", body = Reconciliation),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody)
    )
)]
pub async fn get_balance(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Reconciliation>> {
    let account = state.store.read(|r| UserRepository::new(r).get(&id))?;
    account.authorize_for(Some(&user), Action::Retrieve)?;
    Ok(Json(state.ledger.reconcile(&id)?))
}
