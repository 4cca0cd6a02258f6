// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Green-credit ledger endpoints.
//!
//! Rows are read-only through the API. They are written by registration,
//! wipe completion, redemption, staff adjustments, refunds and
//! subscription purchases.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::extract::{ClientIp, ValidatedJson};
use crate::{
    auth::{list_scope, Action, Auth, Resource, StaffOnly},
    error::ApiResult,
    models::ListParams,
    state::AppState,
    storage::{
        repository::{StoredCreditTransaction, TransactionType},
        AuditEvent, AuditEventType, CreditRepository, OwnershipEnforcer,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreditTransactionResponse {
    pub id: String,
    pub user: String,
    /// Positive for credits, negative for debits
    pub amount: i64,
    pub transaction_type: TransactionType,
    pub certificate: Option<String>,
    pub listing: Option<String>,
    /// Redemption this refund reverses
    pub reverses: Option<String>,
    pub description: Option<String>,
    pub transaction_time: DateTime<Utc>,
}

impl From<StoredCreditTransaction> for CreditTransactionResponse {
    fn from(row: StoredCreditTransaction) -> Self {
        Self {
            id: row.id,
            user: row.user_id,
            amount: row.amount,
            transaction_type: row.transaction_type,
            certificate: row.certificate,
            listing: row.listing,
            reverses: row.reverses,
            description: row.description,
            transaction_time: row.transaction_time,
        }
    }
}

/// Filters for the ledger listing.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CreditFilter {
    /// Only rows of this user (staff; others only ever see their own)
    pub user: Option<String>,
    pub transaction_type: Option<TransactionType>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreditTransactionListResponse {
    pub transactions: Vec<CreditTransactionResponse>,
    pub total: usize,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct RefundRequest {
    #[validate(length(max = 1000, message = "Ensure this field has no more than 1000 characters."))]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefundResponse {
    /// The new `refund` row
    pub transaction: CreditTransactionResponse,
    /// Listing put back on sale, when it still exists
    pub listing: Option<String>,
    /// Buyer's balance after the refund
    pub balance: i64,
}

/// List ledger rows, most recent first.
///
/// Non-staff callers only see their own rows.
#[utoipa::path(
    get,
    path = "/api/green-credit-transactions",
    tag = "Green Credits",
    security(("bearer_auth" = [])),
    params(CreditFilter, ListParams),
    responses(
        (status = 200, description = "Ledger rows", body = CreditTransactionListResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_transactions(
    Auth(user): Auth,
    State(state): State<AppState>,
    Query(filter): Query<CreditFilter>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<CreditTransactionListResponse>> {
    let scope = list_scope(Some(&user), Resource::GreenCreditTransaction)?;
    let rows = state.store.read(|r| CreditRepository::new(r).list())?;
    let rows: Vec<_> = rows
        .into_iter()
        .filter(|t| scope.includes(&t.user_id))
        .filter(|t| filter.user.as_ref().is_none_or(|u| &t.user_id == u))
        .filter(|t| filter.transaction_type.is_none_or(|k| t.transaction_type == k))
        .collect();

    let (page, total) = params.paginate(rows);
    Ok(Json(CreditTransactionListResponse {
        transactions: page.into_iter().map(Into::into).collect(),
        total,
    }))
}

/// Get one ledger row. Owner or staff.
#[utoipa::path(
    get,
    path = "/api/green-credit-transactions/{id}",
    tag = "Green Credits",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Transaction ID")),
    responses(
        (status = 200, description = "Ledger row", body = CreditTransactionResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody)
    )
)]
pub async fn get_transaction(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CreditTransactionResponse>> {
    let row = state.store.read(|r| CreditRepository::new(r).get(&id))?;
    row.authorize_for(Some(&user), Action::Retrieve)?;
    Ok(Json(row.into()))
}

/// Reverse a redemption. Staff only.
///
/// Credits the buyer, puts the listing back on sale and records an admin
/// action. Each redemption can be refunded once.
#[utoipa::path(
    post,
    path = "/api/green-credit-transactions/{id}/refund",
    tag = "Green Credits",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Redemption transaction ID")),
    request_body = RefundRequest,
    responses(
        (status = 200, description = "Redemption refunded", body = RefundResponse),
        (status = 403, description = "Staff required"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 422, description = "Not a redemption, or already refunded", body = crate::error::ErrorBody)
    )
)]
pub async fn refund_transaction(
    StaffOnly(user): StaffOnly,
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
    ValidatedJson(request): ValidatedJson<RefundRequest>,
) -> ApiResult<Json<RefundResponse>> {
    let refund = state
        .ledger
        .refund(&user.user_id, &id, request.reason.as_deref(), ip.as_deref())?;

    state.audit().record(
        &AuditEvent::new(AuditEventType::CreditsRefunded)
            .with_user(&user.user_id)
            .with_resource("green_credit_transaction", &id)
            .with_ip(ip.as_deref())
            .with_details(json!({
                "refund_id": refund.transaction.id,
                "amount": refund.transaction.amount,
                "buyer_id": refund.transaction.user_id,
            })),
    );

    Ok(Json(RefundResponse {
        listing: refund.listing.map(|l| l.id),
        balance: refund.balance,
        transaction: refund.transaction.into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthenticatedUser, Role};
    use crate::storage::repository::StoredUser;
    use crate::test_support::{register_user, test_state};
    use axum::http::StatusCode;

    fn as_user(account: &StoredUser, role: Role) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: account.id.clone(),
            email: account.email.clone(),
            role,
            expires_at: 0,
        }
    }

    #[tokio::test]
    async fn clients_only_see_their_own_rows() {
        let (state, _dir) = test_state();
        let alice = register_user(&state, "alice@example.com");
        let bob = register_user(&state, "bob@example.com");

        let Json(list) = list_transactions(
            Auth(as_user(&alice, Role::Client)),
            State(state.clone()),
            Query(CreditFilter {
                user: Some(bob.id.clone()),
                ..Default::default()
            }),
            Query(ListParams::default()),
        )
        .await
        .unwrap();
        assert_eq!(list.total, 0);

        let Json(list) = list_transactions(
            Auth(as_user(&alice, Role::Staff)),
            State(state.clone()),
            Query(CreditFilter {
                transaction_type: Some(TransactionType::AwardedWipe),
                ..Default::default()
            }),
            Query(ListParams::default()),
        )
        .await
        .unwrap();
        assert_eq!(list.total, 2);

        let bobs_row = list.transactions.iter().find(|t| t.user == bob.id).unwrap();
        let err = get_transaction(
            Auth(as_user(&alice, Role::Client)),
            State(state),
            Path(bobs_row.id.clone()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn registration_award_is_not_refundable() {
        let (state, _dir) = test_state();
        let alice = register_user(&state, "alice@example.com");
        let staff = register_user(&state, "staff@example.com");
        let award = state
            .store
            .read(|r| CreditRepository::new(r).list_for_user(&alice.id))
            .unwrap()
            .remove(0);

        let err = refund_transaction(
            StaffOnly(as_user(&staff, Role::Staff)),
            State(state),
            ClientIp::default(),
            Path(award.id),
            ValidatedJson(RefundRequest::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code, "not_refundable");
    }
}
