// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Staff query over the audit log.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::StaffOnly,
    error::{ApiError, ApiResult},
    state::AppState,
    storage::{AuditEvent, AuditEventType},
};

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;
/// Widest date range one query may scan, in days
const MAX_SPAN_DAYS: i64 = 366;

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditQueryParams {
    /// First day, `YYYY-MM-DD` (default today)
    pub start_date: Option<String>,
    /// Last day, inclusive (default today); at most 366 days after `start_date`
    pub end_date: Option<String>,
    pub user_id: Option<String>,
    #[param(value_type = Option<String>)]
    pub event_type: Option<AuditEventType>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    /// Maximum number of results (default 100, max 1000)
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditLogResponse {
    pub events: Vec<AuditEvent>,
    /// Matches before limit/offset
    pub total: usize,
    pub has_more: bool,
}

fn parse_day(field: &str, value: Option<&str>, today: NaiveDate) -> ApiResult<NaiveDate> {
    match value {
        None => Ok(today),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| ApiError::invalid(field, "Invalid date format. Use YYYY-MM-DD.")),
    }
}

#[utoipa::path(
    get,
    path = "/api/audit-events",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(AuditQueryParams),
    responses(
        (status = 200, description = "Audit events in log order", body = AuditLogResponse),
        (status = 400, description = "Invalid date or range too wide", body = crate::error::ErrorBody),
        (status = 403, description = "Staff required")
    )
)]
pub async fn query_audit_events(
    StaffOnly(_user): StaffOnly,
    State(state): State<AppState>,
    Query(params): Query<AuditQueryParams>,
) -> ApiResult<Json<AuditLogResponse>> {
    let today = Utc::now().date_naive();
    let start = parse_day("start_date", params.start_date.as_deref(), today)?;
    let end = parse_day("end_date", params.end_date.as_deref(), today)?;
    if start > end {
        return Err(ApiError::invalid("end_date", "End date must not precede start date."));
    }
    if (end - start).num_days() >= MAX_SPAN_DAYS {
        return Err(ApiError::invalid(
            "end_date",
            format!("Date range may cover at most {MAX_SPAN_DAYS} days."),
        ));
    }

    let mut events = state
        .audit()
        .read_events_range(
            &start.format("%Y-%m-%d").to_string(),
            &end.format("%Y-%m-%d").to_string(),
        )
        .map_err(ApiError::internal)?;

    let matches = |wanted: &Option<String>, actual: &Option<String>| {
        wanted.is_none() || wanted == actual
    };
    events.retain(|e| {
        matches(&params.user_id, &e.user_id)
            && params.event_type.is_none_or(|t| e.event_type == t)
            && matches(&params.resource_type, &e.resource_type)
            && matches(&params.resource_id, &e.resource_id)
    });

    let total = events.len();
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let offset = params.offset.unwrap_or(0);
    let has_more = offset.saturating_add(limit) < total;
    let events = events.into_iter().skip(offset).take(limit).collect();

    Ok(Json(AuditLogResponse {
        events,
        total,
        has_more,
    }))
}
