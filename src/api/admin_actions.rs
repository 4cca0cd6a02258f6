// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Staff action log. Entries are append-only.

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

use super::extract::{ClientIp, ValidatedJson};
use crate::{
    auth::StaffOnly,
    error::ApiResult,
    models::ListParams,
    state::AppState,
    storage::{
        repository::StoredAdminAction, AdminActionRepository, AuditEvent, AuditEventType,
        StorageError,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdminActionResponse {
    pub id: String,
    pub admin_user: Option<String>,
    pub action_type: String,
    pub target_table: Option<String>,
    pub target_id: Option<String>,
    pub reason: Option<String>,
    pub ip_address: Option<String>,
    pub performed_at: DateTime<Utc>,
}

impl From<StoredAdminAction> for AdminActionResponse {
    fn from(a: StoredAdminAction) -> Self {
        Self {
            id: a.id,
            admin_user: a.admin_user,
            action_type: a.action_type,
            target_table: a.target_table,
            target_id: a.target_id,
            reason: a.reason,
            ip_address: a.ip_address,
            performed_at: a.performed_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminActionListResponse {
    pub actions: Vec<AdminActionResponse>,
    pub total: usize,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AdminActionFilter {
    pub admin_user: Option<String>,
    pub action_type: Option<String>,
    pub target_table: Option<String>,
    pub target_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RecordAdminActionRequest {
    #[validate(length(min = 1, max = 100, message = "Action type must be 1-100 characters."))]
    pub action_type: String,
    #[validate(length(max = 100, message = "Ensure this field has no more than 100 characters."))]
    pub target_table: Option<String>,
    #[validate(length(max = 255, message = "Ensure this field has no more than 255 characters."))]
    pub target_id: Option<String>,
    pub reason: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/admin-actions",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(AdminActionFilter, ListParams),
    responses(
        (status = 200, description = "Actions, most recent first", body = AdminActionListResponse),
        (status = 403, description = "Staff required")
    )
)]
pub async fn list_admin_actions(
    StaffOnly(_user): StaffOnly,
    State(state): State<AppState>,
    Query(filter): Query<AdminActionFilter>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<AdminActionListResponse>> {
    let matches = |wanted: &Option<String>, actual: Option<&str>| {
        wanted.as_deref().is_none_or(|w| actual == Some(w))
    };
    let actions: Vec<_> = state
        .store
        .read(|r| AdminActionRepository::new(r).list())?
        .into_iter()
        .filter(|a| matches(&filter.admin_user, a.admin_user.as_deref()))
        .filter(|a| matches(&filter.action_type, Some(a.action_type.as_str())))
        .filter(|a| matches(&filter.target_table, a.target_table.as_deref()))
        .filter(|a| matches(&filter.target_id, a.target_id.as_deref()))
        .collect();

    let (page, total) = params.paginate(actions);
    Ok(Json(AdminActionListResponse {
        actions: page.into_iter().map(Into::into).collect(),
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin-actions/{id}",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Action ID")),
    responses(
        (status = 200, description = "Action", body = AdminActionResponse),
        (status = 403, description = "Staff required"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody)
    )
)]
pub async fn get_admin_action(
    StaffOnly(_user): StaffOnly,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AdminActionResponse>> {
    let action = state.store.read(|r| AdminActionRepository::new(r).get(&id))?;
    Ok(Json(action.into()))
}

/// Record a manual staff action. The acting user and client address are
/// taken from the request.
#[utoipa::path(
    post,
    path = "/api/admin-actions",
    tag = "Admin",
    security(("bearer_auth" = [])),
    request_body = RecordAdminActionRequest,
    responses(
        (status = 201, description = "Action recorded", body = AdminActionResponse),
        (status = 400, description = "Invalid input", body = crate::error::ErrorBody),
        (status = 403, description = "Staff required")
    )
)]
pub async fn record_admin_action(
    StaffOnly(user): StaffOnly,
    State(state): State<AppState>,
    ip: ClientIp,
    ValidatedJson(request): ValidatedJson<RecordAdminActionRequest>,
) -> ApiResult<(StatusCode, Json<AdminActionResponse>)> {
    let mut action = StoredAdminAction::new(&user.user_id, &request.action_type)
        .reason(request.reason.as_deref())
        .ip(ip.as_deref());
    action.target_table = request.target_table;
    action.target_id = request.target_id;

    state
        .store
        .write(|w| -> Result<_, StorageError> { AdminActionRepository::new(w).record(&action) })?;

    state.audit().record(
        &AuditEvent::new(AuditEventType::AdminActionRecorded)
            .with_user(&user.user_id)
            .with_resource("admin_action", &action.id)
            .with_ip(ip.as_deref())
            .with_details(json!({ "action_type": action.action_type })),
    );
    Ok((StatusCode::CREATED, Json(action.into())))
}
