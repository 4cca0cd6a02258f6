// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account registration and token login.
//!
//! Paths follow the djoser layout (`/auth/users/`, `/auth/token/login/`)
//! so existing clients keep working.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use validator::Validate;

use super::extract::{ClientIp, ValidatedJson};
use super::users::UserResponse;
use crate::{
    auth::{password::verify_password, Auth, AuthError},
    error::{ApiError, ApiResult},
    state::AppState,
    storage::{
        repository::{new_id, StoredUser},
        AuditEvent, AuditEventType, StorageError, UserRepository,
    },
};

/// Registration request.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[validate(length(max = 50, message = "Ensure this field has no more than 50 characters."))]
    pub username: Option<String>,
    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters."))]
    pub password: String,
    #[validate(length(max = 20, message = "Ensure this field has no more than 20 characters."))]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// Login request.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "This field may not be blank."))]
    pub email: String,
    #[validate(length(min = 1, message = "This field may not be blank."))]
    pub password: String,
}

/// Token issued at login.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    /// Bearer token for the `Authorization` header
    pub auth_token: String,
}

/// Hash a password off the async runtime.
pub(crate) async fn hash_password(state: &AppState, password: String) -> ApiResult<String> {
    let config = Arc::clone(&state.auth_config);
    tokio::task::spawn_blocking(move || config.hash_password(&password))
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::from)
}

/// A fresh account record with no balance or allowance yet.
pub(crate) fn new_account(
    email: &str,
    username: Option<String>,
    phone_number: Option<String>,
    first_name: String,
    last_name: String,
    password_hash: String,
) -> StoredUser {
    let now = Utc::now();
    StoredUser {
        id: new_id(),
        email: email.to_string(),
        username: username.filter(|u| !u.trim().is_empty()),
        phone_number: phone_number.filter(|p| !p.trim().is_empty()),
        first_name,
        last_name,
        password_hash,
        wipes_remaining: 0,
        green_credits: 0,
        current_subscription_package: None,
        is_staff: false,
        is_superuser: false,
        is_active: true,
        date_joined: now,
        updated_at: now,
        last_login: None,
    }
}

/// Create the bootstrap superuser unless an account with that email exists.
///
/// Returns the new account, or `None` when nothing was created.
pub fn seed_superuser(state: &AppState, email: &str, password: &str) -> ApiResult<Option<StoredUser>> {
    let existing = state
        .store
        .read(|r| UserRepository::new(r).find_by_email(email))?;
    if let Some(existing) = existing {
        if !existing.is_superuser {
            tracing::warn!(user_id = %existing.id, "Bootstrap admin email belongs to a non-superuser account");
        }
        return Ok(None);
    }

    let hash = state.auth_config.hash_password(password)?;
    let mut admin = new_account(email, None, None, String::new(), String::new(), hash);
    admin.is_staff = true;
    admin.is_superuser = true;
    let admin = state.ledger.register(admin)?;

    tracing::info!(user_id = %admin.id, "Bootstrap superuser created");
    state.audit().record(
        &AuditEvent::new(AuditEventType::UserRegistered)
            .with_user(&admin.id)
            .with_resource("user", &admin.id)
            .with_details(json!({ "bootstrap": true })),
    );
    Ok(Some(admin))
}

/// Register a new account.
///
/// Non-superuser accounts receive the registration allowance: free wipes
/// plus the matching green credits, recorded as one ledger row.
#[utoipa::path(
    post,
    path = "/auth/users/",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = UserResponse),
        (status = 400, description = "Invalid input or duplicate email", body = crate::error::ErrorBody)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    ValidatedJson(request): ValidatedJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let password_hash = hash_password(&state, request.password).await?;
    let account = new_account(
        &request.email,
        request.username,
        request.phone_number,
        request.first_name,
        request.last_name,
        password_hash,
    );
    let account = state.ledger.register(account)?;

    state.audit().record(
        &AuditEvent::new(AuditEventType::UserRegistered)
            .with_user(&account.id)
            .with_resource("user", &account.id)
            .with_ip(ip.as_deref())
            .with_details(json!({
                "wipes_remaining": account.wipes_remaining,
                "green_credits": account.green_credits,
            })),
    );

    Ok((StatusCode::CREATED, Json(UserResponse::from(account))))
}

/// Exchange email and password for a bearer token.
#[utoipa::path(
    post,
    path = "/auth/token/login/",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 400, description = "Invalid credentials", body = crate::error::ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let account = state
        .store
        .read(|r| UserRepository::new(r).find_by_email(&request.email))?;

    // Unknown and inactive accounts still pay for a full hash check.
    let account = account.filter(|a| a.is_active);
    let stored = match &account {
        Some(account) => account.password_hash.clone(),
        None => state.auth_config.decoy_password_hash(),
    };
    let password = request.password;
    let matches = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(ApiError::internal)?
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Stored password hash is unusable");
            false
        });
    let verified = account.filter(|_| matches);

    let Some(account) = verified else {
        state.audit().record(
            &AuditEvent::new(AuditEventType::AuthFailure)
                .with_ip(ip.as_deref())
                .with_details(json!({ "email": request.email }))
                .failed("invalid credentials"),
        );
        return Err(AuthError::InvalidCredentials.into());
    };

    let account = state.store.write(|w| -> Result<_, StorageError> {
        let repo = UserRepository::new(w);
        let mut account = repo.get(&account.id)?;
        account.last_login = Some(Utc::now());
        repo.update(&account)?;
        Ok(account)
    })?;

    let auth_token = state.auth_config.issue(&account.id, account.role())?;
    state.audit().record(
        &AuditEvent::new(AuditEventType::AuthSuccess)
            .with_user(&account.id)
            .with_ip(ip.as_deref()),
    );

    Ok(Json(TokenResponse { auth_token }))
}

/// The authenticated account.
#[utoipa::path(
    get,
    path = "/auth/users/me/",
    tag = "Auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current account", body = UserResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorBody)
    )
)]
pub async fn me(Auth(user): Auth, State(state): State<AppState>) -> ApiResult<Json<UserResponse>> {
    let account = state
        .store
        .read(|r| UserRepository::new(r).get(&user.user_id))?;
    Ok(Json(UserResponse::from(account)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;

    #[test]
    fn seed_superuser_is_idempotent() {
        let (state, _dir) = test_state();
        let admin = seed_superuser(&state, "Root@Example.com", "bootstrap-pass")
            .unwrap()
            .unwrap();
        assert!(admin.is_superuser && admin.is_staff);
        assert_eq!(admin.email, "root@example.com");
        assert_eq!(admin.green_credits, 0);

        assert!(seed_superuser(&state, "root@example.com", "other").unwrap().is_none());
    }

    #[tokio::test]
    async fn register_then_login() {
        let (state, _dir) = test_state();
        let (status, Json(account)) = register(
            State(state.clone()),
            ClientIp::default(),
            ValidatedJson(RegisterRequest {
                email: "new@example.com".into(),
                username: Some("newbie".into()),
                password: "long enough".into(),
                phone_number: None,
                first_name: "New".into(),
                last_name: String::new(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(account.wipes_remaining, 3);
        assert_eq!(account.green_credits, 30);

        let Json(token) = login(
            State(state.clone()),
            ClientIp::default(),
            ValidatedJson(LoginRequest {
                email: "NEW@example.com".into(),
                password: "long enough".into(),
            }),
        )
        .await
        .unwrap();
        let claims = state.auth_config.verify(&token.auth_token).unwrap();
        assert_eq!(claims.sub, account.id);

        let stored = state
            .store
            .read(|r| UserRepository::new(r).get(&account.id))
            .unwrap();
        assert!(stored.last_login.is_some());
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let (state, _dir) = test_state();
        crate::test_support::register_user(&state, "user@example.com");

        let err = login(
            State(state),
            ClientIp::default(),
            ValidatedJson(LoginRequest {
                email: "user@example.com".into(),
                password: "not the password".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "invalid_credentials");
    }

    #[tokio::test]
    async fn unknown_and_inactive_accounts_get_the_same_error() {
        let (state, _dir) = test_state();
        let user = crate::test_support::register_user(&state, "gone@example.com");
        state
            .store
            .write(|w| UserRepository::new(w).deactivate(&user.id))
            .unwrap();

        for email in ["nobody@example.com", "gone@example.com"] {
            let err = login(
                State(state.clone()),
                ClientIp::default(),
                ValidatedJson(LoginRequest {
                    email: email.into(),
                    password: crate::test_support::TEST_PASSWORD.into(),
                }),
            )
            .await
            .unwrap_err();
            assert_eq!(err.status, StatusCode::BAD_REQUEST);
            assert_eq!(err.code, "invalid_credentials");
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_a_validation_error() {
        let (state, _dir) = test_state();
        crate::test_support::register_user(&state, "dup@example.com");

        let err = register(
            State(state),
            ClientIp::default(),
            ValidatedJson(RegisterRequest {
                email: "Dup@Example.com".into(),
                username: None,
                password: "long enough".into(),
                phone_number: None,
                first_name: String::new(),
                last_name: String::new(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, "validation_error");
        assert!(err.fields.unwrap().get("email").is_some());
    }
}
