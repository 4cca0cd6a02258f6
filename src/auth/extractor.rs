// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated users.
//!
//! Use the `Auth` extractor in handlers to require authentication:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is AuthenticatedUser
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::{AuthError, AuthenticatedUser, Role};
use crate::state::AppState;
use crate::storage::{StorageError, UserRepository};

/// Extractor for authenticated users.
///
/// Verifies the bearer token, then loads the account it names. Tokens for
/// deleted or deactivated accounts are rejected, and the role comes from the
/// stored account flags.
///
/// # Example
///
/// ```rust,ignore
/// async fn list_certificates(
///     Auth(user): Auth,
///     State(state): State<AppState>,
/// ) -> Result<Json<CertificateListResponse>, ApiError> {
///     // user.user_id contains the authenticated user's ID
///     // user.role contains their role
/// }
/// ```
pub struct Auth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // First check if an upstream layer already set the user
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().cloned() {
            return Ok(Auth(user));
        }

        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidAuthHeader)?;

        let claims = state.auth_config.verify(token)?;
        let user = load_account(state, &claims.sub, claims.exp)?;

        parts.extensions.insert(user.clone());
        Ok(Auth(user))
    }
}

/// Resolve a token subject to an active account.
fn load_account(state: &AppState, user_id: &str, expires_at: i64) -> Result<AuthenticatedUser, AuthError> {
    let account = state
        .store
        .read(|r| UserRepository::new(r).find(user_id))
        .map_err(|e: StorageError| AuthError::InternalError(e.to_string()))?;

    match account {
        Some(account) if account.is_active => Ok(AuthenticatedUser {
            role: account.role(),
            user_id: account.id,
            email: account.email,
            expires_at,
        }),
        _ => Err(AuthError::AccountDisabled),
    }
}

/// Extractor that requires staff (or admin) role.
pub struct StaffOnly(pub AuthenticatedUser);

impl FromRequestParts<AppState> for StaffOnly {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Auth(user) = Auth::from_request_parts(parts, state).await?;

        if !user.has_role(Role::Staff) {
            return Err(AuthError::PermissionDenied);
        }

        Ok(StaffOnly(user))
    }
}

/// Optional authentication extractor.
///
/// Returns `None` when no Authorization header is present. A header that is
/// present but invalid is still rejected, so a stale token on a public
/// endpoint surfaces as 401 instead of silently downgrading to anonymous.
pub struct OptionalAuth(pub Option<AuthenticatedUser>);

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if parts.extensions.get::<AuthenticatedUser>().is_none()
            && !parts.headers.contains_key(AUTHORIZATION)
        {
            return Ok(OptionalAuth(None));
        }
        let Auth(user) = Auth::from_request_parts(parts, state).await?;
        Ok(OptionalAuth(Some(user)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{register_user, test_state};
    use axum::http::Request;

    fn parts_with(token: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/test");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn auth_extractor_requires_auth_header() {
        let (state, _dir) = test_state();
        let mut parts = parts_with(None);

        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::MissingAuthHeader)));
    }

    #[tokio::test]
    async fn auth_extractor_succeeds_with_issued_token() {
        let (state, _dir) = test_state();
        let account = register_user(&state, "alice@example.com");
        let token = state.auth_config.issue(&account.id, Role::Client).unwrap();
        let mut parts = parts_with(Some(&token));

        let Auth(user) = Auth::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(user.user_id, account.id);
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.role, Role::Client);
    }

    #[tokio::test]
    async fn token_for_unknown_account_is_rejected() {
        let (state, _dir) = test_state();
        let token = state.auth_config.issue("no-such-user", Role::Admin).unwrap();
        let mut parts = parts_with(Some(&token));

        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::AccountDisabled)));
    }

    #[tokio::test]
    async fn role_comes_from_account_not_token() {
        let (state, _dir) = test_state();
        let account = register_user(&state, "bob@example.com");
        // Token claims admin, account is a plain client
        let token = state.auth_config.issue(&account.id, Role::Admin).unwrap();
        let mut parts = parts_with(Some(&token));

        let result = StaffOnly::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::PermissionDenied)));
    }

    #[tokio::test]
    async fn auth_extractor_prefers_extensions() {
        let (state, _dir) = test_state();
        let mut parts = parts_with(None);
        parts.extensions.insert(AuthenticatedUser {
            user_id: "from_layer".to_string(),
            email: "layer@example.com".to_string(),
            role: Role::Staff,
            expires_at: 0,
        });

        let StaffOnly(user) = StaffOnly::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(user.user_id, "from_layer");
    }

    #[tokio::test]
    async fn optional_auth_returns_none_without_header() {
        let (state, _dir) = test_state();
        let mut parts = parts_with(None);

        let OptionalAuth(user) = OptionalAuth::from_request_parts(&mut parts, &state).await.unwrap();
        assert!(user.is_none());
    }

    #[tokio::test]
    async fn optional_auth_rejects_bad_token() {
        let (state, _dir) = test_state();
        let mut parts = parts_with(Some("garbage"));

        let result = OptionalAuth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::MalformedToken)));
    }
}
