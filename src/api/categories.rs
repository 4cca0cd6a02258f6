// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Product category endpoints. Reads are public, writes are staff only.

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
    auth::StaffOnly,
    error::ApiResult,
    models::ListParams,
    state::AppState,
    storage::{
        repository::{new_id, StoredCategory},
        AuditEventType, CategoryRepository, StorageError,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CategoryResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub parent_category: Option<String>,
}

impl From<StoredCategory> for CategoryResponse {
    fn from(c: StoredCategory) -> Self {
        Self {
            id: c.id,
            name: c.name,
            description: c.description,
            parent_category: c.parent_category,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryListResponse {
    pub categories: Vec<CategoryResponse>,
    pub total: usize,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters."))]
    pub name: String,
    pub description: Option<String>,
    pub parent_category: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateCategoryRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters."))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "crate::models::nullable")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    /// `null` makes this a top-level category
    #[serde(default, deserialize_with = "crate::models::nullable")]
    #[schema(value_type = Option<String>)]
    pub parent_category: Option<Option<String>>,
}

#[utoipa::path(
    get,
    path = "/api/categories",
    tag = "Categories",
    params(ListParams),
    responses((status = 200, description = "Categories ordered by name", body = CategoryListResponse))
)]
pub async fn list_categories(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<CategoryListResponse>> {
    let categories = state.store.read(|r| CategoryRepository::new(r).list())?;
    let (page, total) = params.paginate(categories);
    Ok(Json(CategoryListResponse {
        categories: page.into_iter().map(Into::into).collect(),
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/api/categories/{id}",
    tag = "Categories",
    params(("id" = String, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Category", body = CategoryResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody)
    )
)]
pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CategoryResponse>> {
    let category = state.store.read(|r| CategoryRepository::new(r).get(&id))?;
    Ok(Json(category.into()))
}

#[utoipa::path(
    post,
    path = "/api/categories",
    tag = "Categories",
    security(("bearer_auth" = [])),
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Category created", body = CategoryResponse),
        (status = 400, description = "Invalid input", body = crate::error::ErrorBody),
        (status = 403, description = "Staff required")
    )
)]
pub async fn create_category(
    StaffOnly(user): StaffOnly,
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<CreateCategoryRequest>,
) -> ApiResult<(StatusCode, Json<CategoryResponse>)> {
    let category = StoredCategory {
        id: new_id(),
        name: request.name,
        description: request.description,
        parent_category: request.parent_category,
    };
    state
        .store
        .write(|w| CategoryRepository::new(w).create(&category))?;

    audit_log!(state, AuditEventType::CategoryChanged, user, "category", &category.id);
    Ok((StatusCode::CREATED, Json(category.into())))
}

#[utoipa::path(
    patch,
    path = "/api/categories/{id}",
    tag = "Categories",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Category ID")),
    request_body = UpdateCategoryRequest,
    responses(
        (status = 200, description = "Category updated", body = CategoryResponse),
        (status = 400, description = "Invalid input or cycle", body = crate::error::ErrorBody),
        (status = 403, description = "Staff required"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody)
    )
)]
pub async fn update_category(
    StaffOnly(user): StaffOnly,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(request): ValidatedJson<UpdateCategoryRequest>,
) -> ApiResult<Json<CategoryResponse>> {
    let category = state.store.write(|w| -> Result<_, StorageError> {
        let repo = CategoryRepository::new(w);
        let mut category = repo.get(&id)?;
        if let Some(name) = request.name {
            category.name = name;
        }
        if let Some(description) = request.description {
            category.description = description;
        }
        if let Some(parent) = request.parent_category {
            category.parent_category = parent;
        }
        repo.update(&category)?;
        Ok(category)
    })?;

    audit_log!(state, AuditEventType::CategoryChanged, user, "category", &id);
    Ok(Json(category.into()))
}

/// Delete a category. Children and listings are detached, not removed.
#[utoipa::path(
    delete,
    path = "/api/categories/{id}",
    tag = "Categories",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Category ID")),
    responses(
        (status = 204, description = "Category deleted"),
        (status = 403, description = "Staff required"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody)
    )
)]
pub async fn delete_category(
    StaffOnly(user): StaffOnly,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.write(|w| CategoryRepository::new(w).delete(&id))?;
    audit_log!(state, AuditEventType::CategoryChanged, user, "category", &id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthenticatedUser, Role};
    use crate::test_support::test_state;

    fn staff() -> StaffOnly {
        StaffOnly(AuthenticatedUser {
            user_id: "staff-1".into(),
            email: "staff@example.com".into(),
            role: Role::Staff,
            expires_at: 0,
        })
    }

    async fn create(state: &AppState, name: &str, parent: Option<&str>) -> CategoryResponse {
        let (_, Json(category)) = create_category(
            staff(),
            State(state.clone()),
            ValidatedJson(CreateCategoryRequest {
                name: name.into(),
                description: None,
                parent_category: parent.map(str::to_string),
            }),
        )
        .await
        .unwrap();
        category
    }

    #[tokio::test]
    async fn reparenting_under_a_descendant_is_rejected() {
        let (state, _dir) = test_state();
        let phones = create(&state, "Phones", None).await;
        let android = create(&state, "Android", Some(&phones.id)).await;

        let err = update_category(
            staff(),
            State(state),
            Path(phones.id.clone()),
            ValidatedJson(UpdateCategoryRequest {
                parent_category: Some(Some(android.id)),
                ..Default::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, "validation_error");
        assert!(err.fields.unwrap().get("parent_category").is_some());
    }

    #[tokio::test]
    async fn delete_detaches_children() {
        let (state, _dir) = test_state();
        let phones = create(&state, "Phones", None).await;
        let android = create(&state, "Android", Some(&phones.id)).await;

        let status = delete_category(staff(), State(state.clone()), Path(phones.id))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let Json(child) = get_category(State(state.clone()), Path(android.id)).await.unwrap();
        assert!(child.parent_category.is_none());

        let Json(list) = list_categories(State(state), Query(ListParams::default()))
            .await
            .unwrap();
        assert_eq!(list.total, 1);
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let (state, _dir) = test_state();
        create(&state, "Laptops", None).await;

        let err = create_category(
            staff(),
            State(state),
            ValidatedJson(CreateCategoryRequest {
                name: "Laptops".into(),
                description: None,
                parent_category: None,
            }),
        )
        .await
        .unwrap_err();
        assert!(err.fields.unwrap().get("name").is_some());
    }
}
