// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! CleanSlate - Wipe Certificate & Reseller Marketplace Service
//!
//! REST backend for device-wipe certificates, a reseller marketplace,
//! subscription packages and the green-credit loyalty ledger.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Bearer tokens, password hashing and the capability table
//! - `ledger` - Green-credit balances and wipe allowances
//! - `storage` - redb entity store, repositories and audit log

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod state;
pub mod storage;
pub mod tls;
