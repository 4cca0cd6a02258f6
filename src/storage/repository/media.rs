// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Listing media repository. Media are referenced by URL only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

use super::super::database::{EntityTable, ReadTables, Record, Writer, LISTING_MEDIA};
use super::super::{StorageError, StorageResult};
use super::listings::StoredListing;
use super::{claim_unique_fields, require, UniqueField};
use crate::models::FieldErrors;

const MAX_URL_LEN: usize = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    #[default]
    Image,
    Video,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredListingMedia {
    pub id: String,
    pub listing: String,
    pub file_url: String,
    pub media_type: MediaType,
    /// At most one primary item per listing
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

impl Record for StoredListingMedia {
    const TABLE: EntityTable = LISTING_MEDIA;
    const KIND: &'static str = "listing_media";

    fn id(&self) -> &str {
        &self.id
    }
}

pub struct MediaRepository<'a, S> {
    tx: &'a S,
}

impl<'a, S: ReadTables> MediaRepository<'a, S> {
    pub fn new(tx: &'a S) -> Self {
        Self { tx }
    }

    pub fn get(&self, id: &str) -> StorageResult<StoredListingMedia> {
        require(self.tx, id)
    }

    /// All media, oldest first.
    pub fn list(&self) -> StorageResult<Vec<StoredListingMedia>> {
        let mut media: Vec<StoredListingMedia> = self.tx.scan()?;
        media.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(media)
    }

    /// Media of one listing, primary first.
    pub fn list_for_listing(&self, listing_id: &str) -> StorageResult<Vec<StoredListingMedia>> {
        let mut media = self
            .tx
            .filter(|m: &StoredListingMedia| m.listing == listing_id)?;
        media.sort_by(|a, b| {
            b.is_primary
                .cmp(&a.is_primary)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(media)
    }

    /// The listing a media item belongs to.
    pub fn parent(&self, media: &StoredListingMedia) -> StorageResult<StoredListing> {
        require(self.tx, &media.listing)
    }

    fn validate(&self, media: &StoredListingMedia) -> StorageResult<()> {
        let mut errors = FieldErrors::default();
        if media.file_url.chars().count() > MAX_URL_LEN {
            errors.add(
                "file_url",
                format!("Ensure this field has no more than {MAX_URL_LEN} characters."),
            );
        } else {
            match Url::parse(&media.file_url) {
                Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
                _ => errors.add("file_url", "Enter a valid URL."),
            }
        }
        if self.tx.get::<StoredListing>(&media.listing)?.is_none() {
            errors.add(
                "listing",
                format!("Invalid pk \"{}\" - object does not exist.", media.listing),
            );
        }
        Ok(errors.into_result()?)
    }
}

impl MediaRepository<'_, Writer> {
    pub fn create(&self, media: &StoredListingMedia) -> StorageResult<()> {
        self.store(None, media)
    }

    pub fn update(&self, media: &StoredListingMedia) -> StorageResult<()> {
        let previous = self.get(&media.id)?;
        self.store(Some(&previous), media)
    }

    pub fn delete(&self, id: &str) -> StorageResult<StoredListingMedia> {
        let media = self.get(id)?;
        if media.is_primary {
            self.tx
                .release_unique(StoredListingMedia::KIND, "primary", &media.listing)?;
        }
        if !self.tx.remove::<StoredListingMedia>(id)? {
            return Err(StorageError::not_found(StoredListingMedia::KIND, id));
        }
        Ok(media)
    }

    fn store(&self, previous: Option<&StoredListingMedia>, media: &StoredListingMedia) -> StorageResult<()> {
        self.validate(media)?;

        // The primary slot is keyed by listing id
        let primary_of = |m: &StoredListingMedia| m.is_primary.then(|| m.listing.clone());
        let old = previous.and_then(primary_of);
        let new = primary_of(media);
        let claimed = claim_unique_fields(
            self.tx,
            StoredListingMedia::KIND,
            "listing media",
            &media.id,
            &[UniqueField {
                field: "primary",
                old: old.as_deref(),
                new: new.as_deref(),
            }],
        );
        if let Err(StorageError::Validation(_)) = claimed {
            return Err(StorageError::invalid(
                "is_primary",
                "This listing already has a primary media item.",
            ));
        }
        claimed?;

        self.tx.put(media)?;
        Ok(())
    }
}
