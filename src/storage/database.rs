// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded entity database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! Every entity lives in its own table keyed by id with JSON-encoded values:
//!
//! - `users`, `categories`, `certificates`, `listings`, `listing_media`,
//!   `admin_actions`, `subscription_packages`, `user_subscriptions`,
//!   `green_credit_transactions`: id → serialized record
//! - `unique_keys`: `kind:field:value` → owning record id
//!
//! ## Transactions
//!
//! [`Store::write`] runs a closure inside one redb write transaction and
//! commits only when the closure returns `Ok`. redb admits a single writer at
//! a time, so a read-modify-write of a balance inside `write` can never
//! interleave with another one.

use std::path::Path;

use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction,
};
use serde::{de::DeserializeOwned, Serialize};

// =============================================================================
// Table Definitions
// =============================================================================

/// Entity table: id → serialized record (JSON bytes).
pub type EntityTable = TableDefinition<'static, &'static str, &'static [u8]>;

pub const USERS: EntityTable = TableDefinition::new("users");
pub const CATEGORIES: EntityTable = TableDefinition::new("categories");
pub const CERTIFICATES: EntityTable = TableDefinition::new("certificates");
pub const LISTINGS: EntityTable = TableDefinition::new("listings");
pub const LISTING_MEDIA: EntityTable = TableDefinition::new("listing_media");
pub const ADMIN_ACTIONS: EntityTable = TableDefinition::new("admin_actions");
pub const PACKAGES: EntityTable = TableDefinition::new("subscription_packages");
pub const SUBSCRIPTIONS: EntityTable = TableDefinition::new("user_subscriptions");
pub const CREDIT_TRANSACTIONS: EntityTable = TableDefinition::new("green_credit_transactions");

const ENTITY_TABLES: [EntityTable; 9] = [
    USERS,
    CATEGORIES,
    CERTIFICATES,
    LISTINGS,
    LISTING_MEDIA,
    ADMIN_ACTIONS,
    PACKAGES,
    SUBSCRIPTIONS,
    CREDIT_TRANSACTIONS,
];

/// Unique index: `kind:field:value` → id of the record holding the value.
const UNIQUE_KEYS: TableDefinition<&str, &str> = TableDefinition::new("unique_keys");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("failed to create data directory: {0}")]
    Io(#[from] std::io::Error),
}

pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Records
// =============================================================================

/// A persisted entity stored as JSON in its own table.
pub trait Record: Serialize + DeserializeOwned {
    /// Table holding records of this type.
    const TABLE: EntityTable;
    /// Short name used in unique keys and error messages.
    const KIND: &'static str;

    fn id(&self) -> &str;
}

fn unique_key(kind: &str, field: &str, value: &str) -> String {
    format!("{kind}:{field}:{value}")
}

fn get_record<T, Tbl>(table: &Tbl, id: &str) -> DbResult<Option<T>>
where
    T: Record,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(id)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

fn scan_records<T, Tbl>(table: &Tbl) -> DbResult<Vec<T>>
where
    T: Record,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    let mut records = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        records.push(serde_json::from_slice(value.value())?);
    }
    Ok(records)
}

fn lookup_unique<Tbl>(table: &Tbl, key: &str) -> DbResult<Option<String>>
where
    Tbl: ReadableTable<&'static str, &'static str>,
{
    Ok(table.get(key)?.map(|v| v.value().to_string()))
}

// =============================================================================
// Read access (shared by read and write transactions)
// =============================================================================

/// Read operations available inside any transaction.
pub trait ReadTables {
    /// Fetch one record by id.
    fn get<T: Record>(&self, id: &str) -> DbResult<Option<T>>;

    /// Every record of a type, in key order.
    fn scan<T: Record>(&self) -> DbResult<Vec<T>>;

    /// Id of the record holding `value` for a unique field, if any.
    fn unique_owner(&self, kind: &str, field: &str, value: &str) -> DbResult<Option<String>>;

    /// Records of a type matching a predicate.
    fn filter<T: Record>(&self, mut keep: impl FnMut(&T) -> bool) -> DbResult<Vec<T>> {
        Ok(self.scan::<T>()?.into_iter().filter(|r| keep(r)).collect())
    }
}

/// A read-only snapshot.
pub struct Reader {
    txn: ReadTransaction,
}

impl ReadTables for Reader {
    fn get<T: Record>(&self, id: &str) -> DbResult<Option<T>> {
        let table = self.txn.open_table(T::TABLE)?;
        get_record(&table, id)
    }

    fn scan<T: Record>(&self) -> DbResult<Vec<T>> {
        let table = self.txn.open_table(T::TABLE)?;
        scan_records(&table)
    }

    fn unique_owner(&self, kind: &str, field: &str, value: &str) -> DbResult<Option<String>> {
        let table = self.txn.open_table(UNIQUE_KEYS)?;
        lookup_unique(&table, &unique_key(kind, field, value))
    }
}

/// An open write transaction. Nothing is visible to readers until the
/// enclosing [`Store::write`] closure returns `Ok`.
pub struct Writer {
    txn: WriteTransaction,
}

impl ReadTables for Writer {
    fn get<T: Record>(&self, id: &str) -> DbResult<Option<T>> {
        let table = self.txn.open_table(T::TABLE)?;
        get_record(&table, id)
    }

    fn scan<T: Record>(&self) -> DbResult<Vec<T>> {
        let table = self.txn.open_table(T::TABLE)?;
        scan_records(&table)
    }

    fn unique_owner(&self, kind: &str, field: &str, value: &str) -> DbResult<Option<String>> {
        let table = self.txn.open_table(UNIQUE_KEYS)?;
        lookup_unique(&table, &unique_key(kind, field, value))
    }
}

impl Writer {
    /// Insert or replace a record.
    pub fn put<T: Record>(&self, record: &T) -> DbResult<()> {
        let json = serde_json::to_vec(record)?;
        let mut table = self.txn.open_table(T::TABLE)?;
        table.insert(record.id(), json.as_slice())?;
        Ok(())
    }

    /// Remove a record. Returns whether it existed.
    pub fn remove<T: Record>(&self, id: &str) -> DbResult<bool> {
        let mut table = self.txn.open_table(T::TABLE)?;
        let existed = table.remove(id)?.is_some();
        Ok(existed)
    }

    /// Reserve a unique value for `id`.
    ///
    /// Returns `false` when another record already holds the value.
    pub fn claim_unique(&self, kind: &str, field: &str, value: &str, id: &str) -> DbResult<bool> {
        let key = unique_key(kind, field, value);
        let mut table = self.txn.open_table(UNIQUE_KEYS)?;
        let holder = table.get(key.as_str())?.map(|v| v.value().to_string());
        match holder {
            Some(existing) => Ok(existing == id),
            None => {
                table.insert(key.as_str(), id)?;
                Ok(true)
            }
        }
    }

    /// Drop a unique reservation.
    pub fn release_unique(&self, kind: &str, field: &str, value: &str) -> DbResult<()> {
        let key = unique_key(kind, field, value);
        let mut table = self.txn.open_table(UNIQUE_KEYS)?;
        table.remove(key.as_str())?;
        Ok(())
    }
}

// =============================================================================
// Store
// =============================================================================

/// Embedded ACID entity database.
pub struct Store {
    db: Database,
}

impl Store {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            for table in ENTITY_TABLES {
                let _ = write_txn.open_table(table)?;
            }
            let _ = write_txn.open_table(UNIQUE_KEYS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Run `f` against a consistent read snapshot.
    pub fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Reader) -> Result<T, E>,
        E: From<DbError>,
    {
        let txn = self.db.begin_read().map_err(DbError::from)?;
        f(&Reader { txn })
    }

    /// Run `f` inside a write transaction.
    ///
    /// Commits when `f` returns `Ok`; aborts (discarding every write made by
    /// `f`) when it returns `Err`.
    pub fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Writer) -> Result<T, E>,
        E: From<DbError>,
    {
        let txn = self.db.begin_write().map_err(DbError::from)?;
        let writer = Writer { txn };

        match f(&writer) {
            Ok(value) => {
                writer.txn.commit().map_err(DbError::from)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = writer.txn.abort() {
                    tracing::warn!(error = %abort_err, "Failed to abort write transaction");
                }
                Err(err)
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
