// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Subscription package catalog.
//!
//! Anyone may browse the active packages; staff also see retired ones and
//! manage the catalog.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::extract::ValidatedJson;
use crate::{
    audit_log,
    auth::{OptionalAuth, StaffOnly},
    error::{ApiError, ApiResult},
    models::{ListParams, Price},
    state::AppState,
    storage::{
        repository::{new_id, StoredPackage},
        AuditEventType, PackageRepository, StorageError,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PackageResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Wipes per subscription (0 = unlimited)
    pub wipes_allowed: u32,
    pub green_credits_awarded: i64,
    pub price: Price,
    pub is_active: bool,
}

impl From<StoredPackage> for PackageResponse {
    fn from(p: StoredPackage) -> Self {
        Self {
            id: p.id,
            name: p.name,
            description: p.description,
            wipes_allowed: p.wipes_allowed,
            green_credits_awarded: p.green_credits_awarded,
            price: p.price,
            is_active: p.is_active,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PackageListResponse {
    pub packages: Vec<PackageResponse>,
    pub total: usize,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreatePackageRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters."))]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub wipes_allowed: u32,
    #[serde(default)]
    #[validate(range(min = 0, message = "Ensure this value is greater than or equal to 0."))]
    pub green_credits_awarded: i64,
    pub price: Price,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Partial update. Only `is_active` may change while live subscriptions
/// use the package.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdatePackageRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters."))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "crate::models::nullable")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    pub wipes_allowed: Option<u32>,
    #[validate(range(min = 0, message = "Ensure this value is greater than or equal to 0."))]
    pub green_credits_awarded: Option<i64>,
    pub price: Option<Price>,
    pub is_active: Option<bool>,
}

#[utoipa::path(
    get,
    path = "/api/subscription-packages",
    tag = "Subscriptions",
    params(ListParams),
    responses((status = 200, description = "Packages ordered by price", body = PackageListResponse))
)]
pub async fn list_packages(
    OptionalAuth(user): OptionalAuth,
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<PackageListResponse>> {
    let show_retired = user.as_ref().is_some_and(|u| u.is_staff());
    let packages: Vec<_> = state
        .store
        .read(|r| PackageRepository::new(r).list())?
        .into_iter()
        .filter(|p| show_retired || p.is_active)
        .collect();

    let (page, total) = params.paginate(packages);
    Ok(Json(PackageListResponse {
        packages: page.into_iter().map(Into::into).collect(),
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/api/subscription-packages/{id}",
    tag = "Subscriptions",
    params(("id" = String, Path, description = "Package ID")),
    responses(
        (status = 200, description = "Package", body = PackageResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody)
    )
)]
pub async fn get_package(
    OptionalAuth(user): OptionalAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PackageResponse>> {
    let package = state.store.read(|r| PackageRepository::new(r).get(&id))?;
    if !package.is_active && !user.as_ref().is_some_and(|u| u.is_staff()) {
        return Err(ApiError::not_found(format!("subscription_package {id} not found")));
    }
    Ok(Json(package.into()))
}

#[utoipa::path(
    post,
    path = "/api/subscription-packages",
    tag = "Subscriptions",
    security(("bearer_auth" = [])),
    request_body = CreatePackageRequest,
    responses(
        (status = 201, description = "Package created", body = PackageResponse),
        (status = 400, description = "Invalid input", body = crate::error::ErrorBody),
        (status = 403, description = "Staff required")
    )
)]
pub async fn create_package(
    StaffOnly(user): StaffOnly,
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<CreatePackageRequest>,
) -> ApiResult<(StatusCode, Json<PackageResponse>)> {
    let package = StoredPackage {
        id: new_id(),
        name: request.name,
        description: request.description,
        wipes_allowed: request.wipes_allowed,
        green_credits_awarded: request.green_credits_awarded,
        price: request.price,
        is_active: request.is_active,
    };
    state
        .store
        .write(|w| PackageRepository::new(w).create(&package))?;

    audit_log!(state, AuditEventType::PackageChanged, user, "subscription_package", &package.id);
    Ok((StatusCode::CREATED, Json(package.into())))
}

#[utoipa::path(
    patch,
    path = "/api/subscription-packages/{id}",
    tag = "Subscriptions",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Package ID")),
    request_body = UpdatePackageRequest,
    responses(
        (status = 200, description = "Package updated", body = PackageResponse),
        (status = 400, description = "Invalid input or terms frozen", body = crate::error::ErrorBody),
        (status = 403, description = "Staff required"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody)
    )
)]
pub async fn update_package(
    StaffOnly(user): StaffOnly,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(request): ValidatedJson<UpdatePackageRequest>,
) -> ApiResult<Json<PackageResponse>> {
    let package = state.store.write(|w| -> Result<_, StorageError> {
        let repo = PackageRepository::new(w);
        let mut package = repo.get(&id)?;
        if let Some(name) = request.name {
            package.name = name;
        }
        if let Some(description) = request.description {
            package.description = description;
        }
        if let Some(wipes) = request.wipes_allowed {
            package.wipes_allowed = wipes;
        }
        if let Some(credits) = request.green_credits_awarded {
            package.green_credits_awarded = credits;
        }
        if let Some(price) = request.price {
            package.price = price;
        }
        if let Some(is_active) = request.is_active {
            package.is_active = is_active;
        }
        repo.update(&package)?;
        Ok(package)
    })?;

    audit_log!(state, AuditEventType::PackageChanged, user, "subscription_package", &id);
    Ok(Json(package.into()))
}

/// Delete a package that no subscription references.
#[utoipa::path(
    delete,
    path = "/api/subscription-packages/{id}",
    tag = "Subscriptions",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Package ID")),
    responses(
        (status = 204, description = "Package deleted"),
        (status = 403, description = "Staff required"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Referenced by subscriptions", body = crate::error::ErrorBody)
    )
)]
pub async fn delete_package(
    StaffOnly(user): StaffOnly,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.write(|w| PackageRepository::new(w).delete(&id))?;
    audit_log!(state, AuditEventType::PackageChanged, user, "subscription_package", &id);
    Ok(StatusCode::NO_CONTENT)
}
