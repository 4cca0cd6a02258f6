// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Marketplace listing endpoints.
//!
//! Browsing is public. Any account may list a device for sale; the seller
//! or staff manage it afterwards. `POST /api/listings/{id}/redeem` buys a
//! redeemable listing with green credits.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use validator::Validate;

use super::credits::CreditTransactionResponse;
use super::extract::{ClientIp, ValidatedJson};
use super::media::MediaResponse;
use crate::{
    audit_log,
    auth::{Action, Auth, AuthenticatedUser},
    error::{ApiError, ApiResult},
    models::{ListParams, Price},
    state::AppState,
    storage::{
        repository::{new_id, ListingCondition, ListingStatus, StoredListing, StoredListingMedia},
        AuditEvent, AuditEventType, ListingFilter, ListingRepository, MediaRepository,
        OwnershipEnforcer, StorageError,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListingResponse {
    pub id: String,
    /// Seller
    pub user: String,
    pub title: String,
    pub description: Option<String>,
    pub price: Price,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub model_name: Option<String>,
    pub condition: ListingCondition,
    pub health_score: Option<i32>,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_redeemable_with_green_credits: bool,
    pub green_credit_price: Option<i64>,
    pub certificate: Option<String>,
    /// Primary item first
    pub media: Vec<MediaResponse>,
}

impl ListingResponse {
    fn with_media(l: StoredListing, media: Vec<StoredListingMedia>) -> Self {
        Self {
            id: l.id,
            user: l.user_id,
            title: l.title,
            description: l.description,
            price: l.price,
            category: l.category,
            brand: l.brand,
            model_name: l.model_name,
            condition: l.condition,
            health_score: l.health_score,
            status: l.status,
            created_at: l.created_at,
            updated_at: l.updated_at,
            is_redeemable_with_green_credits: l.is_redeemable_with_green_credits,
            green_credit_price: l.green_credit_price,
            certificate: l.certificate,
            media: media.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListingListResponse {
    pub listings: Vec<ListingResponse>,
    pub total: usize,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateListingRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters."))]
    pub title: String,
    pub description: Option<String>,
    pub price: Price,
    pub category: Option<String>,
    #[validate(length(max = 100, message = "Ensure this field has no more than 100 characters."))]
    pub brand: Option<String>,
    #[validate(length(max = 100, message = "Ensure this field has no more than 100 characters."))]
    pub model_name: Option<String>,
    #[serde(default)]
    pub condition: ListingCondition,
    #[validate(range(min = 0, max = 100, message = "Ensure this value is between 0 and 100."))]
    pub health_score: Option<i32>,
    #[serde(default)]
    pub status: ListingStatus,
    #[serde(default)]
    pub is_redeemable_with_green_credits: bool,
    pub green_credit_price: Option<i64>,
    /// Certificate of the wiped device; must belong to the seller
    pub certificate: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateListingRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters."))]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "crate::models::nullable")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    pub price: Option<Price>,
    #[serde(default, deserialize_with = "crate::models::nullable")]
    #[schema(value_type = Option<String>)]
    pub category: Option<Option<String>>,
    #[serde(default, deserialize_with = "crate::models::nullable")]
    #[schema(value_type = Option<String>)]
    pub brand: Option<Option<String>>,
    #[serde(default, deserialize_with = "crate::models::nullable")]
    #[schema(value_type = Option<String>)]
    pub model_name: Option<Option<String>>,
    pub condition: Option<ListingCondition>,
    #[serde(default, deserialize_with = "crate::models::nullable")]
    #[schema(value_type = Option<i32>)]
    pub health_score: Option<Option<i32>>,
    pub status: Option<ListingStatus>,
    pub is_redeemable_with_green_credits: Option<bool>,
    #[serde(default, deserialize_with = "crate::models::nullable")]
    #[schema(value_type = Option<i64>)]
    pub green_credit_price: Option<Option<i64>>,
    #[serde(default, deserialize_with = "crate::models::nullable")]
    #[schema(value_type = Option<String>)]
    pub certificate: Option<Option<String>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RedeemResponse {
    /// The `redeemed_purchase` ledger row
    pub transaction: CreditTransactionResponse,
    pub listing: ListingResponse,
    /// Buyer's balance after the debit
    pub balance: i64,
}

/// `sold` is reached through redemption and left through refunds.
fn check_status_change(user: &AuthenticatedUser, from: ListingStatus, to: ListingStatus) -> ApiResult<()> {
    let touches_sold = from != to && (from == ListingStatus::Sold || to == ListingStatus::Sold);
    if touches_sold && !user.is_staff() {
        return Err(ApiError::invalid(
            "status",
            "Only staff may move a listing into or out of sold.",
        ));
    }
    Ok(())
}

/// Browse listings, newest first, each with its media.
#[utoipa::path(
    get,
    path = "/api/listings",
    tag = "Listings",
    params(ListingFilter, ListParams),
    responses((status = 200, description = "Listings", body = ListingListResponse))
)]
pub async fn list_listings(
    State(state): State<AppState>,
    Query(filter): Query<ListingFilter>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<ListingListResponse>> {
    let (listings, media) = state.store.read(|r| -> Result<_, StorageError> {
        Ok((
            ListingRepository::new(r).list(&filter)?,
            MediaRepository::new(r).list()?,
        ))
    })?;
    let (page, total) = params.paginate(listings);

    let mut by_listing: HashMap<String, Vec<StoredListingMedia>> = HashMap::new();
    for item in media {
        by_listing.entry(item.listing.clone()).or_default().push(item);
    }

    let listings = page
        .into_iter()
        .map(|listing| {
            let mut media = by_listing.remove(&listing.id).unwrap_or_default();
            media.sort_by(|a, b| b.is_primary.cmp(&a.is_primary));
            ListingResponse::with_media(listing, media)
        })
        .collect();
    Ok(Json(ListingListResponse { listings, total }))
}

#[utoipa::path(
    get,
    path = "/api/listings/{id}",
    tag = "Listings",
    params(("id" = String, Path, description = "Listing ID")),
    responses(
        (status = 200, description = "Listing with media", body = ListingResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody)
    )
)]
pub async fn get_listing(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ListingResponse>> {
    let (listing, media) = state.store.read(|r| -> Result<_, StorageError> {
        Ok((
            ListingRepository::new(r).get(&id)?,
            MediaRepository::new(r).list_for_listing(&id)?,
        ))
    })?;
    Ok(Json(ListingResponse::with_media(listing, media)))
}

/// Put a device on sale. The requester is the seller.
#[utoipa::path(
    post,
    path = "/api/listings",
    tag = "Listings",
    security(("bearer_auth" = [])),
    request_body = CreateListingRequest,
    responses(
        (status = 201, description = "Listing created", body = ListingResponse),
        (status = 400, description = "Invalid input", body = crate::error::ErrorBody),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn create_listing(
    Auth(user): Auth,
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<CreateListingRequest>,
) -> ApiResult<(StatusCode, Json<ListingResponse>)> {
    if request.status == ListingStatus::Sold && !user.is_staff() {
        return Err(ApiError::invalid("status", "A new listing cannot start as sold."));
    }

    let now = Utc::now();
    let listing = StoredListing {
        id: new_id(),
        user_id: user.user_id.clone(),
        title: request.title,
        description: request.description,
        price: request.price,
        category: request.category,
        brand: request.brand,
        model_name: request.model_name,
        condition: request.condition,
        health_score: request.health_score,
        status: request.status,
        created_at: now,
        updated_at: now,
        is_redeemable_with_green_credits: request.is_redeemable_with_green_credits,
        green_credit_price: request.green_credit_price,
        certificate: request.certificate,
    };
    state
        .store
        .write(|w| ListingRepository::new(w).create(&listing))?;

    audit_log!(state, AuditEventType::ListingCreated, user, "listing", &listing.id);
    Ok((StatusCode::CREATED, Json(ListingResponse::with_media(listing, Vec::new()))))
}

#[utoipa::path(
    patch,
    path = "/api/listings/{id}",
    tag = "Listings",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Listing ID")),
    request_body = UpdateListingRequest,
    responses(
        (status = 200, description = "Listing updated", body = ListingResponse),
        (status = 400, description = "Invalid input", body = crate::error::ErrorBody),
        (status = 403, description = "Not the seller"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody)
    )
)]
pub async fn update_listing(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(request): ValidatedJson<UpdateListingRequest>,
) -> ApiResult<Json<ListingResponse>> {
    let (listing, media) = state.store.write(|w| -> ApiResult<_> {
        let repo = ListingRepository::new(w);
        let mut listing = repo.get(&id)?;
        listing.authorize_for(Some(&user), Action::Update)?;

        if let Some(status) = request.status {
            check_status_change(&user, listing.status, status)?;
            listing.status = status;
        }
        if let Some(title) = request.title {
            listing.title = title;
        }
        if let Some(description) = request.description {
            listing.description = description;
        }
        if let Some(price) = request.price {
            listing.price = price;
        }
        if let Some(category) = request.category {
            listing.category = category;
        }
        if let Some(brand) = request.brand {
            listing.brand = brand;
        }
        if let Some(model_name) = request.model_name {
            listing.model_name = model_name;
        }
        if let Some(condition) = request.condition {
            listing.condition = condition;
        }
        if let Some(score) = request.health_score {
            listing.health_score = score;
        }
        if let Some(redeemable) = request.is_redeemable_with_green_credits {
            listing.is_redeemable_with_green_credits = redeemable;
        }
        if let Some(price) = request.green_credit_price {
            listing.green_credit_price = price;
        }
        if let Some(certificate) = request.certificate {
            listing.certificate = certificate;
        }
        listing.updated_at = Utc::now();
        repo.update(&listing)?;

        let media = MediaRepository::new(w).list_for_listing(&id)?;
        Ok((listing, media))
    })?;

    audit_log!(state, AuditEventType::ListingUpdated, user, "listing", &id);
    Ok(Json(ListingResponse::with_media(listing, media)))
}

/// Delete a listing and its media.
///
/// Listings that appear in the credit ledger are kept.
#[utoipa::path(
    delete,
    path = "/api/listings/{id}",
    tag = "Listings",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Listing ID")),
    responses(
        (status = 204, description = "Listing deleted"),
        (status = 403, description = "Not the seller"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Referenced by the ledger", body = crate::error::ErrorBody)
    )
)]
pub async fn delete_listing(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.write(|w| -> ApiResult<_> {
        let repo = ListingRepository::new(w);
        repo.get(&id)?.authorize_for(Some(&user), Action::Delete)?;
        repo.delete(&id)?;
        Ok(())
    })?;

    audit_log!(state, AuditEventType::ListingDeleted, user, "listing", &id);
    Ok(StatusCode::NO_CONTENT)
}

/// Buy a listing with green credits.
///
/// Fails with `listing_not_redeemable` for listings not offered for
/// credits, `listing_unavailable` when the listing is not active or belongs
/// to the buyer, and `insufficient_credits` when the balance is too low.
#[utoipa::path(
    post,
    path = "/api/listings/{id}/redeem",
    tag = "Listings",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Listing ID")),
    responses(
        (status = 200, description = "Listing redeemed", body = RedeemResponse),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 422, description = "Ledger rule violated", body = crate::error::ErrorBody)
    )
)]
pub async fn redeem_listing(
    Auth(user): Auth,
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
) -> ApiResult<Json<RedeemResponse>> {
    let redemption = match state.ledger.redeem(&user.user_id, &id) {
        Ok(redemption) => redemption,
        Err(e) => {
            tracing::warn!(user_id = %user.user_id, listing_id = %id, error = %e, "Redemption rejected");
            return Err(e.into());
        }
    };

    state.audit().record(
        &AuditEvent::new(AuditEventType::CreditsRedeemed)
            .with_user(&user.user_id)
            .with_resource("listing", &id)
            .with_ip(ip.as_deref())
            .with_details(json!({
                "amount": redemption.transaction.amount,
                "balance": redemption.balance,
                "transaction_id": redemption.transaction.id,
            })),
    );

    let media = state
        .store
        .read(|r| MediaRepository::new(r).list_for_listing(&id))?;
    Ok(Json(RedeemResponse {
        transaction: redemption.transaction.into(),
        listing: ListingResponse::with_media(redemption.listing, media),
        balance: redemption.balance,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::storage::repository::StoredUser;
    use crate::test_support::{register_user, test_state};

    fn as_user(account: &StoredUser) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: account.id.clone(),
            email: account.email.clone(),
            role: Role::Client,
            expires_at: 0,
        }
    }

    fn phone(green_credit_price: Option<i64>) -> CreateListingRequest {
        CreateListingRequest {
            title: "Refurbished phone".into(),
            description: None,
            price: Price::parse("120.00").unwrap(),
            category: None,
            brand: Some("Acme".into()),
            model_name: None,
            condition: ListingCondition::LikeNew,
            health_score: Some(88),
            status: ListingStatus::Active,
            is_redeemable_with_green_credits: green_credit_price.is_some(),
            green_credit_price,
            certificate: None,
        }
    }

    async fn create(state: &AppState, seller: &StoredUser, request: CreateListingRequest) -> ListingResponse {
        let (_, Json(listing)) = create_listing(Auth(as_user(seller)), State(state.clone()), ValidatedJson(request))
            .await
            .unwrap();
        listing
    }

    #[tokio::test]
    async fn redeemable_listing_requires_a_credit_price() {
        let (state, _dir) = test_state();
        let seller = register_user(&state, "seller@example.com");

        let mut request = phone(None);
        request.is_redeemable_with_green_credits = true;
        let err = create_listing(Auth(as_user(&seller)), State(state), ValidatedJson(request))
            .await
            .unwrap_err();
        assert!(err.fields.unwrap().get("green_credit_price").is_some());
    }

    #[tokio::test]
    async fn redeem_debits_buyer_and_marks_sold() {
        let (state, _dir) = test_state();
        let seller = register_user(&state, "seller@example.com");
        let buyer = register_user(&state, "buyer@example.com");
        let listing = create(&state, &seller, phone(Some(30))).await;

        let Json(redeemed) = redeem_listing(
            Auth(as_user(&buyer)),
            State(state.clone()),
            ClientIp::default(),
            Path(listing.id.clone()),
        )
        .await
        .unwrap();
        assert_eq!(redeemed.balance, 0);
        assert_eq!(redeemed.transaction.amount, -30);
        assert_eq!(redeemed.listing.status, ListingStatus::Sold);

        let err = redeem_listing(
            Auth(as_user(&buyer)),
            State(state.clone()),
            ClientIp::default(),
            Path(listing.id.clone()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, "listing_unavailable");

        let err = delete_listing(Auth(as_user(&seller)), State(state), Path(listing.id))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn sellers_cannot_mark_sold_by_hand() {
        let (state, _dir) = test_state();
        let seller = register_user(&state, "seller@example.com");
        let listing = create(&state, &seller, phone(None)).await;

        let err = update_listing(
            Auth(as_user(&seller)),
            State(state.clone()),
            Path(listing.id.clone()),
            ValidatedJson(UpdateListingRequest {
                status: Some(ListingStatus::Sold),
                ..Default::default()
            }),
        )
        .await
        .unwrap_err();
        assert!(err.fields.unwrap().get("status").is_some());

        let Json(withdrawn) = update_listing(
            Auth(as_user(&seller)),
            State(state),
            Path(listing.id),
            ValidatedJson(UpdateListingRequest {
                status: Some(ListingStatus::Withdrawn),
                brand: Some(None),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(withdrawn.status, ListingStatus::Withdrawn);
        assert!(withdrawn.brand.is_none());
    }

    #[tokio::test]
    async fn list_filters_and_nests_media() {
        let (state, _dir) = test_state();
        let seller = register_user(&state, "seller@example.com");
        let redeemable = create(&state, &seller, phone(Some(10))).await;
        create(&state, &seller, phone(None)).await;

        state
            .store
            .write(|w| {
                MediaRepository::new(w).create(&StoredListingMedia {
                    id: new_id(),
                    listing: redeemable.id.clone(),
                    file_url: "https://cdn.example.com/phone.jpg".into(),
                    media_type: Default::default(),
                    is_primary: true,
                    created_at: Utc::now(),
                })
            })
            .unwrap();

        let Json(list) = list_listings(
            State(state),
            Query(ListingFilter {
                redeemable: Some(true),
                ..Default::default()
            }),
            Query(ListParams::default()),
        )
        .await
        .unwrap();
        assert_eq!(list.total, 1);
        assert_eq!(list.listings[0].id, redeemable.id);
        assert_eq!(list.listings[0].media.len(), 1);
    }
}
