// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Product category repository.
//!
//! Categories form a tree through `parent_category`. Removing a category
//! detaches its children and its listings instead of cascading.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::super::database::{EntityTable, ReadTables, Record, Writer, CATEGORIES};
use super::super::{StorageError, StorageResult};
use super::listings::StoredListing;
use super::{check_length, check_required, claim_unique_fields, require, UniqueField};
use crate::models::FieldErrors;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredCategory {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub parent_category: Option<String>,
}

impl Record for StoredCategory {
    const TABLE: EntityTable = CATEGORIES;
    const KIND: &'static str = "category";

    fn id(&self) -> &str {
        &self.id
    }
}

pub struct CategoryRepository<'a, S> {
    tx: &'a S,
}

impl<'a, S: ReadTables> CategoryRepository<'a, S> {
    pub fn new(tx: &'a S) -> Self {
        Self { tx }
    }

    pub fn get(&self, id: &str) -> StorageResult<StoredCategory> {
        require(self.tx, id)
    }

    pub fn find(&self, id: &str) -> StorageResult<Option<StoredCategory>> {
        Ok(self.tx.get(id)?)
    }

    /// All categories ordered by name.
    pub fn list(&self) -> StorageResult<Vec<StoredCategory>> {
        let mut categories: Vec<StoredCategory> = self.tx.scan()?;
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    fn validate(&self, category: &StoredCategory) -> StorageResult<()> {
        let mut errors = FieldErrors::default();
        check_required(&mut errors, "name", &category.name, 100);
        check_length(&mut errors, "description", category.description.as_deref(), 10_000);

        // Walk up from the proposed parent; reaching this category means a cycle
        let mut cursor = category.parent_category.clone();
        let mut depth = 0usize;
        while let Some(parent_id) = cursor {
            if parent_id == category.id {
                errors.add("parent_category", "A category cannot be its own ancestor.");
                break;
            }
            match self.find(&parent_id)? {
                Some(parent) => cursor = parent.parent_category,
                None => {
                    if depth == 0 {
                        errors.add(
                            "parent_category",
                            format!("Invalid pk \"{parent_id}\" - object does not exist."),
                        );
                    }
                    break;
                }
            }
            depth += 1;
        }

        Ok(errors.into_result()?)
    }
}

impl CategoryRepository<'_, Writer> {
    pub fn create(&self, category: &StoredCategory) -> StorageResult<()> {
        self.store(None, category)
    }

    pub fn update(&self, category: &StoredCategory) -> StorageResult<()> {
        let previous = self.get(&category.id)?;
        self.store(Some(&previous), category)
    }

    /// Delete a category, detaching child categories and listings.
    pub fn delete(&self, id: &str) -> StorageResult<()> {
        let category = self.get(id)?;

        for mut child in self
            .tx
            .filter(|c: &StoredCategory| c.parent_category.as_deref() == Some(id))?
        {
            child.parent_category = None;
            self.tx.put(&child)?;
        }

        let now = Utc::now();
        for mut listing in self
            .tx
            .filter(|l: &StoredListing| l.category.as_deref() == Some(id))?
        {
            listing.category = None;
            listing.updated_at = now;
            self.tx.put(&listing)?;
        }

        self.tx
            .release_unique(StoredCategory::KIND, "name", &category.name)?;
        if !self.tx.remove::<StoredCategory>(id)? {
            return Err(StorageError::not_found(StoredCategory::KIND, id));
        }
        Ok(())
    }

    fn store(&self, previous: Option<&StoredCategory>, category: &StoredCategory) -> StorageResult<()> {
        self.validate(category)?;
        claim_unique_fields(
            self.tx,
            StoredCategory::KIND,
            "category",
            &category.id,
            &[UniqueField {
                field: "name",
                old: previous.map(|p| p.name.as_str()),
                new: Some(&category.name),
            }],
        )?;
        self.tx.put(category)?;
        Ok(())
    }
}
