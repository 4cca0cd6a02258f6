// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access token issuance and verification (HS256).

use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};

use super::{claims::TokenClaims, password, AuthError, Role};

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Default token lifetime (24 hours).
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Default issuer claim.
pub const DEFAULT_ISSUER: &str = "cleanslate";

/// Authentication configuration shared by the login endpoint and the
/// request extractors.
#[derive(Clone)]
pub struct AuthConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    /// Expected (and issued) `iss` claim
    pub issuer: String,
    /// Token lifetime in seconds
    pub token_ttl_secs: i64,
    /// PBKDF2 work factor for new password hashes
    pub password_iterations: u32,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("issuer", &self.issuer)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("password_iterations", &self.password_iterations)
            .finish_non_exhaustive()
    }
}

impl AuthConfig {
    /// Create a configuration signing with the given shared secret.
    pub fn new(secret: &[u8], issuer: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            password_iterations: password::DEFAULT_ITERATIONS,
        }
    }

    /// Set the token lifetime.
    pub fn with_token_ttl(mut self, secs: i64) -> Self {
        self.token_ttl_secs = secs;
        self
    }

    /// Set the PBKDF2 iteration count.
    pub fn with_password_iterations(mut self, iterations: u32) -> Self {
        self.password_iterations = iterations;
        self
    }

    /// Issue a signed token for a user.
    pub fn issue(&self, user_id: &str, role: Role) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = TokenClaims {
            sub: user_id.to_string(),
            role,
            iss: self.issuer.clone(),
            iat: now,
            exp: now + self.token_ttl_secs,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::InternalError(format!("token encoding failed: {e}")))
    }

    /// Verify a token's signature, expiry and issuer.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation.validate_aud = false;

        decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
                ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
                _ => AuthError::MalformedToken,
            })
    }

    /// Hash to verify against when no account matches a login.
    pub fn decoy_password_hash(&self) -> String {
        password::decoy_hash(self.password_iterations)
    }

    /// Hash a password with the configured work factor.
    pub fn hash_password(&self, plain: &str) -> Result<String, AuthError> {
        password::hash_password(plain, self.password_iterations)
            .map_err(|e| AuthError::InternalError(e.to_string()))
    }
}
