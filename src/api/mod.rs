// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{error::ErrorBody, ledger::Reconciliation, state::AppState};

pub mod admin_actions;
pub mod audit;
pub mod auth;
pub mod categories;
pub mod certificates;
pub mod credits;
pub mod extract;
pub mod health;
pub mod listings;
pub mod media;
pub mod packages;
pub mod subscriptions;
pub mod users;

pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    let auth_routes = Router::new()
        .route("/users/", post(auth::register))
        .route("/users/me/", get(auth::me))
        .route("/token/login/", post(auth::login));

    let api_routes = Router::new()
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/{id}",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route("/users/{id}/adjust-credits", post(users::adjust_credits))
        .route("/users/{id}/balance", get(users::get_balance))
        .route(
            "/categories",
            get(categories::list_categories).post(categories::create_category),
        )
        .route(
            "/categories/{id}",
            get(categories::get_category)
                .patch(categories::update_category)
                .delete(categories::delete_category),
        )
        .route(
            "/subscription-packages",
            get(packages::list_packages).post(packages::create_package),
        )
        .route(
            "/subscription-packages/{id}",
            get(packages::get_package)
                .patch(packages::update_package)
                .delete(packages::delete_package),
        )
        .route(
            "/certificates",
            get(certificates::list_certificates).post(certificates::create_certificate),
        )
        .route(
            "/certificates/{id}",
            get(certificates::get_certificate)
                .patch(certificates::update_certificate)
                .delete(certificates::delete_certificate),
        )
        .route(
            "/listings",
            get(listings::list_listings).post(listings::create_listing),
        )
        .route(
            "/listings/{id}",
            get(listings::get_listing)
                .patch(listings::update_listing)
                .delete(listings::delete_listing),
        )
        .route("/listings/{id}/redeem", post(listings::redeem_listing))
        .route(
            "/listing-media",
            get(media::list_media).post(media::create_media),
        )
        .route(
            "/listing-media/{id}",
            get(media::get_media)
                .patch(media::update_media)
                .delete(media::delete_media),
        )
        .route(
            "/user-subscriptions",
            get(subscriptions::list_subscriptions).post(subscriptions::purchase_subscription),
        )
        .route(
            "/user-subscriptions/{id}",
            get(subscriptions::get_subscription)
                .patch(subscriptions::update_subscription)
                .delete(subscriptions::delete_subscription),
        )
        .route(
            "/green-credit-transactions",
            get(credits::list_transactions),
        )
        .route(
            "/green-credit-transactions/{id}",
            get(credits::get_transaction),
        )
        .route(
            "/green-credit-transactions/{id}/refund",
            post(credits::refund_transaction),
        )
        .route(
            "/admin-actions",
            get(admin_actions::list_admin_actions).post(admin_actions::record_admin_action),
        )
        .route("/admin-actions/{id}", get(admin_actions::get_admin_action))
        .route("/audit-events", get(audit::query_audit_events));

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    Router::new()
        .nest("/auth", auth_routes)
        .nest("/api", api_routes)
        .merge(health_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(cors_layer(cors_origins)),
        )
}

/// Any origin when none are configured, otherwise exactly the listed ones.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers(Any)
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register,
        auth::login,
        auth::me,
        users::list_users,
        users::create_user,
        users::get_user,
        users::update_user,
        users::delete_user,
        users::adjust_credits,
        users::get_balance,
        categories::list_categories,
        categories::get_category,
        categories::create_category,
        categories::update_category,
        categories::delete_category,
        packages::list_packages,
        packages::get_package,
        packages::create_package,
        packages::update_package,
        packages::delete_package,
        certificates::list_certificates,
        certificates::get_certificate,
        certificates::create_certificate,
        certificates::update_certificate,
        certificates::delete_certificate,
        listings::list_listings,
        listings::get_listing,
        listings::create_listing,
        listings::update_listing,
        listings::delete_listing,
        listings::redeem_listing,
        media::list_media,
        media::get_media,
        media::create_media,
        media::update_media,
        media::delete_media,
        subscriptions::list_subscriptions,
        subscriptions::get_subscription,
        subscriptions::purchase_subscription,
        subscriptions::update_subscription,
        subscriptions::delete_subscription,
        credits::list_transactions,
        credits::get_transaction,
        credits::refund_transaction,
        admin_actions::list_admin_actions,
        admin_actions::get_admin_action,
        admin_actions::record_admin_action,
        audit::query_audit_events,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(schemas(ErrorBody, Reconciliation)),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Registration and token login"),
        (name = "Users", description = "Accounts and credit balances"),
        (name = "Certificates", description = "Device-wipe certificates"),
        (name = "Listings", description = "Reseller marketplace listings and media"),
        (name = "Categories", description = "Listing category tree"),
        (name = "Subscriptions", description = "Packages and user subscriptions"),
        (name = "Green Credits", description = "Green-credit ledger"),
        (name = "Admin", description = "Staff action log and audit events"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn liveness_echoes_request_id() {
        let (state, _dir) = test_state();
        let app = router(state, &[]);

        let response = app
            .oneshot(Request::get("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn protected_routes_require_a_token() {
        let (state, _dir) = test_state();
        let app = router(state, &[]);

        let response = app
            .oneshot(Request::get("/api/certificates").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn configured_origins_are_enforced() {
        let (state, _dir) = test_state();
        let app = router(state, &["https://app.example".to_string()]);

        let response = app
            .oneshot(
                Request::get("/health/live")
                    .header(header::ORIGIN, "https://app.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://app.example"
        );
    }

    #[test]
    fn openapi_documents_bearer_auth() {
        let doc = ApiDoc::openapi();
        let components = doc.components.unwrap();
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(doc.paths.paths.contains_key("/api/listings/{id}/redeem"));
    }
}
