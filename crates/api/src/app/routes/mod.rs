use axum::{Router, routing::get};

pub mod admin;
pub mod applications;
pub mod auth;
pub mod common;
pub mod properties;
pub mod system;

/// Endpoints reachable without a session.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/uploads/*key", get(system::upload))
        .merge(auth::public())
        .merge(properties::public())
}

/// Endpoints that require a resolved principal.
pub fn protected_router() -> Router {
    Router::new()
        .merge(auth::protected())
        .merge(properties::protected())
        .merge(applications::router())
        .merge(admin::router())
}
