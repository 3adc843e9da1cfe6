use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    response::IntoResponse,
    routing::get,
};

use campusstay_core::PropertyId;
use campusstay_infra::services::Services;

use crate::app::dto::{self, PropertyResponse};
use crate::app::errors;
use crate::authz;
use crate::context::PrincipalContext;

/// Public catalogue.
pub fn public() -> Router {
    Router::new()
        .route("/properties", get(list_properties))
        .route("/properties/:id", get(get_property))
}

pub fn protected() -> Router {
    Router::new().route("/student/recommended-properties", get(recommended))
}

pub async fn list_properties(
    Extension(services): Extension<Arc<Services>>,
) -> axum::response::Response {
    match services.properties.list_public().await {
        Ok(list) => Json(dto::properties(&list)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_property(
    Extension(services): Extension<Arc<Services>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: PropertyId = match errors::parse_id(&id, "property") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.properties.get_public(id).await {
        Ok(property) => Json(PropertyResponse::from(&property)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn recommended(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
) -> axum::response::Response {
    let student = match authz::student(&ctx) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match services.properties.recommended_for(student.campus).await {
        Ok(list) => Json(dto::properties(&list)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
