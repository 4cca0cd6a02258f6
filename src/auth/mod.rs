// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer-token authentication and the capability table for the CleanSlate
//! API.
//!
//! ## Auth Flow
//!
//! 1. Client registers at `POST /auth/users/` (password hashed with PBKDF2)
//! 2. Client logs in at `POST /auth/token/login/` and receives an HS256 JWT
//! 3. Client sends `Authorization: Bearer <token>`
//! 4. Server:
//!    - Verifies signature, expiry and issuer
//!    - Loads the account named by `sub` and rejects inactive accounts
//!    - Derives the role from the account's staff/superuser flags
//!
//! ## Security
//!
//! - Clock skew tolerance is 60 seconds
//! - Every handler checks [`permissions::authorize`] before touching data

pub mod claims;
pub mod error;
pub mod extractor;
pub mod password;
pub mod permissions;
pub mod roles;
pub mod tokens;

pub use claims::{AuthenticatedUser, TokenClaims};
pub use error::AuthError;
pub use extractor::{Auth, OptionalAuth, StaffOnly};
pub use permissions::{authorize, list_scope, Action, ListScope, Resource};
pub use roles::Role;
pub use tokens::AuthConfig;
