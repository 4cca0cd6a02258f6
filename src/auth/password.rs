// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Password hashing with PBKDF2-HMAC-SHA256.
//!
//! Hashes are stored as `pbkdf2_sha256$<iterations>$<salt>$<hash>` with
//! standard base64 salt and hash, so the iteration count can be raised
//! without invalidating existing accounts.

use std::num::NonZeroU32;

use base64ct::{Base64, Encoding};
use ring::{
    pbkdf2,
    rand::{SecureRandom, SystemRandom},
};

const SCHEME: &str = "pbkdf2_sha256";
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

/// Default work factor for new hashes.
pub const DEFAULT_ITERATIONS: u32 = 600_000;

static ALGORITHM: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("random number generator failure")]
    Rng,

    #[error("iteration count must be positive")]
    ZeroIterations,

    #[error("stored password hash is malformed")]
    Malformed,
}

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str, iterations: u32) -> Result<String, PasswordError> {
    let rounds = NonZeroU32::new(iterations).ok_or(PasswordError::ZeroIterations)?;

    let mut salt = [0u8; SALT_LEN];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| PasswordError::Rng)?;

    let mut hash = [0u8; HASH_LEN];
    pbkdf2::derive(ALGORITHM, rounds, &salt, password.as_bytes(), &mut hash);

    Ok(format!(
        "{SCHEME}${iterations}${}${}",
        Base64::encode_string(&salt),
        Base64::encode_string(&hash)
    ))
}

/// A well-formed hash no password matches. Verifying against it costs the
/// same as a real account, so unknown emails are not faster to reject.
pub fn decoy_hash(iterations: u32) -> String {
    format!(
        "{SCHEME}${iterations}${}${}",
        Base64::encode_string(&[0u8; SALT_LEN]),
        Base64::encode_string(&[0u8; HASH_LEN])
    )
}

/// Check a password against a stored hash.
///
/// Returns `Ok(false)` on mismatch and `Err` only when the stored value
/// cannot be parsed.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, PasswordError> {
    let mut parts = stored.split('$');
    let (Some(scheme), Some(iterations), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(PasswordError::Malformed);
    };

    if scheme != SCHEME {
        return Err(PasswordError::Malformed);
    }
    let rounds = iterations
        .parse::<u32>()
        .ok()
        .and_then(NonZeroU32::new)
        .ok_or(PasswordError::Malformed)?;
    let salt = Base64::decode_vec(salt).map_err(|_| PasswordError::Malformed)?;
    let hash = Base64::decode_vec(hash).map_err(|_| PasswordError::Malformed)?;

    Ok(pbkdf2::verify(ALGORITHM, rounds, &salt, password.as_bytes(), &hash).is_ok())
}
