// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Shared Data Models
//!
//! Value types shared by the storage, ledger and API layers.
//!
//! - [`Price`]: a monetary amount with two decimal places (listings, packages)
//! - [`FieldErrors`]: field-level validation detail carried by 400 responses
//! - [`ListParams`]: `limit`/`offset` pagination for collection endpoints
//! - [`nullable`]: tells an absent PATCH field apart from an explicit `null`

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use utoipa::{IntoParams, ToSchema};

// =============================================================================
// Price Type
// =============================================================================

/// Largest accepted price: ten digits with two decimal places.
const MAX_PRICE_MINOR: i64 = 99_999_999_99;

/// Monetary amount with two decimal places, held as minor units.
///
/// Serialized as a decimal string (`"149.90"`). Deserializes from either a
/// string or a JSON number; more than two fraction digits, negative values
/// and values above `99999999.99` are rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "PriceInput", into = "String")]
#[schema(value_type = String, example = "149.90")]
pub struct Price(i64);

impl Price {
    /// Build a price from minor units (cents).
    pub fn from_minor(minor: i64) -> Option<Self> {
        (0..=MAX_PRICE_MINOR).contains(&minor).then_some(Self(minor))
    }

    /// Amount in minor units.
    pub fn minor(&self) -> i64 {
        self.0
    }

    /// Parse a decimal string such as `"12"`, `"12.5"` or `"12.50"`.
    pub fn parse(input: &str) -> Result<Self, String> {
        let input = input.trim();
        let (whole, fraction) = match input.split_once('.') {
            Some((w, f)) => (w, f),
            None => (input, ""),
        };

        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err("A valid number is required.".to_string());
        }
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err("A valid number is required.".to_string());
        }
        if fraction.len() > 2 {
            return Err("Ensure that there are no more than 2 decimal places.".to_string());
        }

        let whole: i64 = whole
            .parse()
            .map_err(|_| "Ensure that there are no more than 10 digits in total.".to_string())?;
        let cents: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| "A valid number is required.")? * 10,
            _ => fraction.parse::<i64>().map_err(|_| "A valid number is required.")?,
        };

        whole
            .checked_mul(100)
            .and_then(|w| w.checked_add(cents))
            .and_then(Self::from_minor)
            .ok_or_else(|| "Ensure that there are no more than 10 digits in total.".to_string())
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl From<Price> for String {
    fn from(value: Price) -> Self {
        value.to_string()
    }
}

/// Wire forms accepted for a price.
#[derive(Deserialize)]
#[serde(untagged)]
enum PriceInput {
    Text(String),
    Number(serde_json::Number),
}

impl TryFrom<PriceInput> for Price {
    type Error = String;

    fn try_from(value: PriceInput) -> Result<Self, Self::Error> {
        match value {
            PriceInput::Text(s) => Price::parse(&s),
            PriceInput::Number(n) => Price::parse(&n.to_string()),
        }
    }
}

// =============================================================================
// Field Errors
// =============================================================================

/// Field name → list of messages, as returned in the `fields` member of a
/// 400 response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    /// Errors with a single message for one field.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }

    /// Append a message for a field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Messages recorded for a field.
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Pagination
// =============================================================================

const DEFAULT_PAGE_SIZE: usize = 100;
const MAX_PAGE_SIZE: usize = 500;

/// Pagination parameters accepted by every collection endpoint.
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// Maximum number of results (default 100, max 500).
    pub limit: Option<usize>,
    /// Number of results to skip.
    pub offset: Option<usize>,
}

impl ListParams {
    /// Apply `offset`/`limit` to an already ordered result set.
    ///
    /// Returns the page and the total count before pagination.
    pub fn paginate<T>(&self, items: Vec<T>) -> (Vec<T>, usize) {
        let total = items.len();
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let page = items
            .into_iter()
            .skip(self.offset.unwrap_or(0))
            .take(limit)
            .collect();
        (page, total)
    }
}

// =============================================================================
// Partial Updates
// =============================================================================

/// Deserializer for nullable PATCH fields.
///
/// Use with `#[serde(default, deserialize_with = "nullable")]` on an
/// `Option<Option<T>>`: a missing field stays `None`, `null` becomes
/// `Some(None)` and a value becomes `Some(Some(v))`.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
