// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Listing media endpoints.
//!
//! Media have no owner of their own; writes are authorized against the
//! parent listing's seller.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::extract::ValidatedJson;
use crate::{
    audit_log,
    auth::{Action, Auth},
    error::ApiResult,
    models::ListParams,
    state::AppState,
    storage::{
        repository::{new_id, MediaType, StoredListingMedia},
        AuditEventType, ListingRepository, MediaRepository, OwnershipEnforcer, StorageError,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MediaResponse {
    pub id: String,
    pub listing: String,
    pub file_url: String,
    pub media_type: MediaType,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

impl From<StoredListingMedia> for MediaResponse {
    fn from(m: StoredListingMedia) -> Self {
        Self {
            id: m.id,
            listing: m.listing,
            file_url: m.file_url,
            media_type: m.media_type,
            is_primary: m.is_primary,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MediaListResponse {
    pub media: Vec<MediaResponse>,
    pub total: usize,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MediaFilter {
    /// Only media of this listing
    pub listing: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateMediaRequest {
    pub listing: String,
    #[validate(url(message = "Enter a valid URL."))]
    pub file_url: String,
    #[serde(default)]
    pub media_type: MediaType,
    #[serde(default)]
    pub is_primary: bool,
}

/// Partial update. Media cannot move to another listing.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateMediaRequest {
    #[validate(url(message = "Enter a valid URL."))]
    pub file_url: Option<String>,
    pub media_type: Option<MediaType>,
    pub is_primary: Option<bool>,
}

#[utoipa::path(
    get,
    path = "/api/listing-media",
    tag = "Listings",
    params(MediaFilter, ListParams),
    responses((status = 200, description = "Media, oldest first", body = MediaListResponse))
)]
pub async fn list_media(
    State(state): State<AppState>,
    Query(filter): Query<MediaFilter>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<MediaListResponse>> {
    let media = state.store.read(|r| {
        let repo = MediaRepository::new(r);
        match &filter.listing {
            Some(listing) => repo.list_for_listing(listing),
            None => repo.list(),
        }
    })?;
    let (page, total) = params.paginate(media);
    Ok(Json(MediaListResponse {
        media: page.into_iter().map(Into::into).collect(),
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/api/listing-media/{id}",
    tag = "Listings",
    params(("id" = String, Path, description = "Media ID")),
    responses(
        (status = 200, description = "Media item", body = MediaResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody)
    )
)]
pub async fn get_media(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MediaResponse>> {
    let media = state.store.read(|r| MediaRepository::new(r).get(&id))?;
    Ok(Json(media.into()))
}

/// Attach media to a listing. Seller or staff.
#[utoipa::path(
    post,
    path = "/api/listing-media",
    tag = "Listings",
    security(("bearer_auth" = [])),
    request_body = CreateMediaRequest,
    responses(
        (status = 201, description = "Media attached", body = MediaResponse),
        (status = 400, description = "Invalid input or second primary", body = crate::error::ErrorBody),
        (status = 403, description = "Not the seller")
    )
)]
pub async fn create_media(
    Auth(user): Auth,
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<CreateMediaRequest>,
) -> ApiResult<(StatusCode, Json<MediaResponse>)> {
    let media = StoredListingMedia {
        id: new_id(),
        listing: request.listing,
        file_url: request.file_url,
        media_type: request.media_type,
        is_primary: request.is_primary,
        created_at: Utc::now(),
    };

    state.store.write(|w| -> ApiResult<_> {
        // An unknown listing is a field error, not a 404
        match ListingRepository::new(w).get(&media.listing) {
            Ok(listing) => listing.authorize_for(Some(&user), Action::Update)?,
            Err(StorageError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }
        MediaRepository::new(w).create(&media)?;
        Ok(())
    })?;

    audit_log!(state, AuditEventType::MediaChanged, user, "listing_media", &media.id);
    Ok((StatusCode::CREATED, Json(media.into())))
}

#[utoipa::path(
    patch,
    path = "/api/listing-media/{id}",
    tag = "Listings",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Media ID")),
    request_body = UpdateMediaRequest,
    responses(
        (status = 200, description = "Media updated", body = MediaResponse),
        (status = 400, description = "Invalid input", body = crate::error::ErrorBody),
        (status = 403, description = "Not the seller"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody)
    )
)]
pub async fn update_media(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(request): ValidatedJson<UpdateMediaRequest>,
) -> ApiResult<Json<MediaResponse>> {
    let media = state.store.write(|w| -> ApiResult<_> {
        let repo = MediaRepository::new(w);
        let mut media = repo.get(&id)?;
        repo.parent(&media)?.authorize_for(Some(&user), Action::Update)?;

        if let Some(url) = request.file_url {
            media.file_url = url;
        }
        if let Some(media_type) = request.media_type {
            media.media_type = media_type;
        }
        if let Some(primary) = request.is_primary {
            media.is_primary = primary;
        }
        repo.update(&media)?;
        Ok(media)
    })?;

    audit_log!(state, AuditEventType::MediaChanged, user, "listing_media", &id);
    Ok(Json(media.into()))
}

#[utoipa::path(
    delete,
    path = "/api/listing-media/{id}",
    tag = "Listings",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Media ID")),
    responses(
        (status = 204, description = "Media removed"),
        (status = 403, description = "Not the seller"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody)
    )
)]
pub async fn delete_media(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.write(|w| -> ApiResult<_> {
        let repo = MediaRepository::new(w);
        let media = repo.get(&id)?;
        repo.parent(&media)?.authorize_for(Some(&user), Action::Delete)?;
        repo.delete(&id)?;
        Ok(())
    })?;

    audit_log!(state, AuditEventType::MediaChanged, user, "listing_media", &id);
    Ok(StatusCode::NO_CONTENT)
}
