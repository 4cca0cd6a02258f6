// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User account repository.
//!
//! Email, username and phone number are unique. Emails are stored in their
//! normalized form (NFKC, lowercase) so lookups are case-insensitive.
//! Accounts are never removed; deactivation clears `is_active`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use super::super::database::{ReadTables, Record, Writer, USERS};
use super::super::StorageResult;
use super::packages::StoredPackage;
use super::{check_length, check_reference, claim_unique_fields, require, UniqueField};
use crate::auth::Role;
use crate::models::FieldErrors;

/// Account stored in the `users` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredUser {
    /// Unique user identifier (UUID)
    pub id: String,
    /// Normalized email address (login identifier)
    pub email: String,
    pub username: Option<String>,
    pub phone_number: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    /// PBKDF2 hash; never returned to clients
    pub password_hash: String,
    /// Wipes still available to the user
    pub wipes_remaining: u32,
    /// Cached green-credit balance (always equals the ledger sum)
    pub green_credits: i64,
    /// Package of the most recent subscription purchase
    pub current_subscription_package: Option<String>,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl StoredUser {
    /// Role derived from the account flags.
    pub fn role(&self) -> Role {
        Role::for_account(self.is_superuser, self.is_staff)
    }
}

impl Record for StoredUser {
    const TABLE: super::super::database::EntityTable = USERS;
    const KIND: &'static str = "user";

    fn id(&self) -> &str {
        &self.id
    }
}

impl super::super::OwnedResource for StoredUser {
    const RESOURCE: crate::auth::Resource = crate::auth::Resource::User;

    fn owner_user_id(&self) -> &str {
        &self.id
    }
}

/// Normalize an email address for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().nfkc().collect::<String>().to_lowercase()
}

/// Repository for user accounts.
pub struct UserRepository<'a, S> {
    tx: &'a S,
}

impl<'a, S: ReadTables> UserRepository<'a, S> {
    pub fn new(tx: &'a S) -> Self {
        Self { tx }
    }

    /// Get a user by ID, if present.
    pub fn find(&self, user_id: &str) -> StorageResult<Option<StoredUser>> {
        Ok(self.tx.get(user_id)?)
    }

    /// Get a user by ID.
    pub fn get(&self, user_id: &str) -> StorageResult<StoredUser> {
        require(self.tx, user_id)
    }

    /// Look up an account by email (any casing).
    pub fn find_by_email(&self, email: &str) -> StorageResult<Option<StoredUser>> {
        let email = normalize_email(email);
        match self.tx.unique_owner(StoredUser::KIND, "email", &email)? {
            Some(id) => self.find(&id),
            None => Ok(None),
        }
    }

    /// All accounts, ordered by email.
    pub fn list(&self) -> StorageResult<Vec<StoredUser>> {
        let mut users: Vec<StoredUser> = self.tx.scan()?;
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }

    fn validate(&self, user: &StoredUser) -> StorageResult<()> {
        let mut errors = FieldErrors::default();
        if user.email.is_empty() {
            errors.add("email", "This field may not be blank.");
        }
        check_length(&mut errors, "email", Some(&user.email), 254);
        check_length(&mut errors, "username", user.username.as_deref(), 50);
        check_length(&mut errors, "phone_number", user.phone_number.as_deref(), 20);
        check_length(&mut errors, "first_name", Some(&user.first_name), 150);
        check_length(&mut errors, "last_name", Some(&user.last_name), 150);
        if user.green_credits < 0 {
            errors.add("green_credits", "Ensure this value is greater than or equal to 0.");
        }
        check_reference::<StoredPackage, _>(
            self.tx,
            &mut errors,
            "current_subscription_package",
            user.current_subscription_package.as_deref(),
        )?;
        Ok(errors.into_result()?)
    }
}

impl UserRepository<'_, Writer> {
    /// Insert a new account.
    pub fn create(&self, user: &StoredUser) -> StorageResult<()> {
        self.store(None, user)
    }

    /// Replace an existing account, keeping the unique index in step.
    pub fn update(&self, user: &StoredUser) -> StorageResult<()> {
        let previous = self.get(&user.id)?;
        self.store(Some(&previous), user)
    }

    /// Clear `is_active`. Returns the updated account.
    pub fn deactivate(&self, user_id: &str) -> StorageResult<StoredUser> {
        let mut user = self.get(user_id)?;
        user.is_active = false;
        user.updated_at = Utc::now();
        self.tx.put(&user)?;
        Ok(user)
    }

    fn store(&self, previous: Option<&StoredUser>, user: &StoredUser) -> StorageResult<()> {
        let mut user = user.clone();
        user.email = normalize_email(&user.email);
        self.validate(&user)?;

        claim_unique_fields(
            self.tx,
            StoredUser::KIND,
            "user",
            &user.id,
            &[
                UniqueField {
                    field: "email",
                    old: previous.map(|p| p.email.as_str()),
                    new: Some(&user.email),
                },
                UniqueField {
                    field: "username",
                    old: previous.and_then(|p| p.username.as_deref()),
                    new: user.username.as_deref(),
                },
                UniqueField {
                    field: "phone_number",
                    old: previous.and_then(|p| p.phone_number.as_deref()),
                    new: user.phone_number.as_deref(),
                },
            ],
        )?;

        self.tx.put(&user)?;
        Ok(())
    }
}
