// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wipe certificate endpoints.
//!
//! Creation against a subscription consumes one wipe of its allowance.
//! Moving a certificate to `success` completes the wipe: the owner's
//! allowance drops by one and the paid-wipe credit award is recorded.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::extract::ValidatedJson;
use crate::{
    audit_log,
    auth::{list_scope, Action, Auth, Resource},
    error::{ApiError, ApiResult},
    models::ListParams,
    state::AppState,
    storage::{
        repository::{
            new_id, CertificateStatus, DeviceType, OperatingSystem, StoredCertificate, WipingMethod,
        },
        AuditEvent, AuditEventType, CertificateRepository, OwnershipEnforcer,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CertificateResponse {
    pub id: String,
    pub user: String,
    pub user_subscription: Option<String>,
    pub device_serial_number: String,
    pub wiping_method: WipingMethod,
    pub status: CertificateStatus,
    pub wiped_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub device_type: Option<DeviceType>,
    pub operating_system: Option<OperatingSystem>,
    pub health_score_at_wipe: Option<i32>,
    pub blockchain_tx_hash: Option<String>,
    pub qr_code_data: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub is_invalidated: bool,
}

impl From<StoredCertificate> for CertificateResponse {
    fn from(c: StoredCertificate) -> Self {
        Self {
            id: c.id,
            user: c.user_id,
            user_subscription: c.user_subscription,
            device_serial_number: c.device_serial_number,
            wiping_method: c.wiping_method,
            status: c.status,
            wiped_at: c.wiped_at,
            completed_at: c.completed_at,
            device_type: c.device_type,
            operating_system: c.operating_system,
            health_score_at_wipe: c.health_score_at_wipe,
            blockchain_tx_hash: c.blockchain_tx_hash,
            qr_code_data: c.qr_code_data,
            generated_at: c.generated_at,
            is_invalidated: c.is_invalidated,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CertificateListResponse {
    pub certificates: Vec<CertificateResponse>,
    pub total: usize,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CertificateFilter {
    pub status: Option<CertificateStatus>,
    /// Owner filter (staff only; others only see their own)
    pub user: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateCertificateRequest {
    /// Owner; defaults to the requester. Staff only when set to someone else.
    pub user: Option<String>,
    /// Subscription whose allowance pays for the wipe
    pub user_subscription: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Serial number must be 1-255 characters."))]
    pub device_serial_number: String,
    pub wiping_method: WipingMethod,
    #[serde(default)]
    pub status: CertificateStatus,
    pub wiped_at: Option<DateTime<Utc>>,
    pub device_type: Option<DeviceType>,
    pub operating_system: Option<OperatingSystem>,
    #[validate(range(min = 0, max = 100, message = "Ensure this value is between 0 and 100."))]
    pub health_score_at_wipe: Option<i32>,
    #[validate(length(max = 255, message = "Ensure this field has no more than 255 characters."))]
    pub blockchain_tx_hash: Option<String>,
    pub qr_code_data: Option<String>,
}

/// Partial update. The serial number, owner and subscription are fixed.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateCertificateRequest {
    pub wiping_method: Option<WipingMethod>,
    /// Only a `pending` certificate may change status
    pub status: Option<CertificateStatus>,
    pub wiped_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "crate::models::nullable")]
    #[schema(value_type = Option<DeviceType>)]
    pub device_type: Option<Option<DeviceType>>,
    #[serde(default, deserialize_with = "crate::models::nullable")]
    #[schema(value_type = Option<OperatingSystem>)]
    pub operating_system: Option<Option<OperatingSystem>>,
    #[serde(default, deserialize_with = "crate::models::nullable")]
    #[schema(value_type = Option<i32>)]
    pub health_score_at_wipe: Option<Option<i32>>,
    #[serde(default, deserialize_with = "crate::models::nullable")]
    #[schema(value_type = Option<String>)]
    pub blockchain_tx_hash: Option<Option<String>>,
    #[serde(default, deserialize_with = "crate::models::nullable")]
    #[schema(value_type = Option<String>)]
    pub qr_code_data: Option<Option<String>>,
    /// Staff only. An invalidated certificate is frozen.
    pub is_invalidated: Option<bool>,
}

/// List certificates, newest first. Non-staff callers see their own.
#[utoipa::path(
    get,
    path = "/api/certificates",
    tag = "Certificates",
    security(("bearer_auth" = [])),
    params(CertificateFilter, ListParams),
    responses(
        (status = 200, description = "Certificates", body = CertificateListResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_certificates(
    Auth(user): Auth,
    State(state): State<AppState>,
    Query(filter): Query<CertificateFilter>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<CertificateListResponse>> {
    let scope = list_scope(Some(&user), Resource::Certificate)?;
    let certificates: Vec<_> = state
        .store
        .read(|r| CertificateRepository::new(r).list())?
        .into_iter()
        .filter(|c| scope.includes(&c.user_id))
        .filter(|c| filter.status.is_none_or(|s| c.status == s))
        .filter(|c| filter.user.as_ref().is_none_or(|u| &c.user_id == u))
        .collect();

    let (page, total) = params.paginate(certificates);
    Ok(Json(CertificateListResponse {
        certificates: page.into_iter().map(Into::into).collect(),
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/api/certificates/{id}",
    tag = "Certificates",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Certificate ID")),
    responses(
        (status = 200, description = "Certificate", body = CertificateResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody)
    )
)]
pub async fn get_certificate(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CertificateResponse>> {
    let certificate = state.store.read(|r| CertificateRepository::new(r).get(&id))?;
    certificate.authorize_for(Some(&user), Action::Retrieve)?;
    Ok(Json(certificate.into()))
}

/// Record a wipe.
///
/// A certificate created as `success` completes immediately.
#[utoipa::path(
    post,
    path = "/api/certificates",
    tag = "Certificates",
    security(("bearer_auth" = [])),
    request_body = CreateCertificateRequest,
    responses(
        (status = 201, description = "Certificate created", body = CertificateResponse),
        (status = 400, description = "Invalid input", body = crate::error::ErrorBody),
        (status = 403, description = "Owner is someone else"),
        (status = 422, description = "Subscription inactive or exhausted", body = crate::error::ErrorBody)
    )
)]
pub async fn create_certificate(
    Auth(user): Auth,
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<CreateCertificateRequest>,
) -> ApiResult<(StatusCode, Json<CertificateResponse>)> {
    let owner = request.user.unwrap_or_else(|| user.user_id.clone());
    if !user.owns(&owner) && !user.is_staff() {
        return Err(ApiError::forbidden("Certificates can only be created for yourself"));
    }

    let now = Utc::now();
    let certificate = state.ledger.create_certificate(StoredCertificate {
        id: new_id(),
        user_id: owner,
        user_subscription: request.user_subscription,
        device_serial_number: request.device_serial_number,
        wiping_method: request.wiping_method,
        status: request.status,
        wiped_at: request.wiped_at.unwrap_or(now),
        completed_at: None,
        device_type: request.device_type,
        operating_system: request.operating_system,
        health_score_at_wipe: request.health_score_at_wipe,
        blockchain_tx_hash: request.blockchain_tx_hash,
        qr_code_data: request.qr_code_data,
        generated_at: now,
        is_invalidated: false,
    })?;

    audit_log!(state, AuditEventType::CertificateCreated, user, "certificate", &certificate.id);
    if certificate.status == CertificateStatus::Success {
        audit_log!(state, AuditEventType::WipeCompleted, user, "certificate", &certificate.id);
    }
    Ok((StatusCode::CREATED, Json(certificate.into())))
}

/// Update a certificate. Owner or staff.
///
/// Setting `status` to `success` completes the wipe.
#[utoipa::path(
    patch,
    path = "/api/certificates/{id}",
    tag = "Certificates",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Certificate ID")),
    request_body = UpdateCertificateRequest,
    responses(
        (status = 200, description = "Certificate updated", body = CertificateResponse),
        (status = 400, description = "Invalid input", body = crate::error::ErrorBody),
        (status = 403, description = "Not permitted"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 422, description = "Invalidated, or status already final", body = crate::error::ErrorBody)
    )
)]
pub async fn update_certificate(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(request): ValidatedJson<UpdateCertificateRequest>,
) -> ApiResult<Json<CertificateResponse>> {
    let mut certificate = state.store.read(|r| CertificateRepository::new(r).get(&id))?;
    certificate.authorize_for(Some(&user), Action::Update)?;
    if request.is_invalidated.is_some() && !user.is_staff() {
        return Err(ApiError::forbidden("Only staff may invalidate certificates"));
    }
    let was_success = certificate.status == CertificateStatus::Success;

    if let Some(method) = request.wiping_method {
        certificate.wiping_method = method;
    }
    if let Some(status) = request.status {
        certificate.status = status;
    }
    if let Some(wiped_at) = request.wiped_at {
        certificate.wiped_at = wiped_at;
    }
    if let Some(device_type) = request.device_type {
        certificate.device_type = device_type;
    }
    if let Some(os) = request.operating_system {
        certificate.operating_system = os;
    }
    if let Some(score) = request.health_score_at_wipe {
        certificate.health_score_at_wipe = score;
    }
    if let Some(hash) = request.blockchain_tx_hash {
        certificate.blockchain_tx_hash = hash;
    }
    if let Some(qr) = request.qr_code_data {
        certificate.qr_code_data = qr;
    }
    if let Some(invalidated) = request.is_invalidated {
        certificate.is_invalidated = invalidated;
    }

    let certificate = state.ledger.update_certificate(certificate)?;

    state.audit().record(
        &AuditEvent::new(AuditEventType::CertificateUpdated)
            .with_user(&user.user_id)
            .with_resource("certificate", &certificate.id)
            .with_details(json!({
                "status": certificate.status,
                "is_invalidated": certificate.is_invalidated,
            })),
    );
    if !was_success && certificate.status == CertificateStatus::Success {
        audit_log!(state, AuditEventType::WipeCompleted, user, "certificate", &certificate.id);
    }
    Ok(Json(certificate.into()))
}

/// Delete a certificate that has not completed.
#[utoipa::path(
    delete,
    path = "/api/certificates/{id}",
    tag = "Certificates",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Certificate ID")),
    responses(
        (status = 204, description = "Certificate deleted"),
        (status = 403, description = "Not permitted"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Completed wipes are kept", body = crate::error::ErrorBody)
    )
)]
pub async fn delete_certificate(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let certificate = state.store.read(|r| CertificateRepository::new(r).get(&id))?;
    certificate.authorize_for(Some(&user), Action::Delete)?;
    state.ledger.delete_certificate(&id)?;

    audit_log!(state, AuditEventType::CertificateDeleted, user, "certificate", &id);
    Ok(StatusCode::NO_CONTENT)
}
