use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde_json::json;

use campusstay_infra::services::Services;

use crate::app::errors;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

/// Serve a stored blob. Used when blobs are published under this server's
/// `/uploads` prefix.
pub async fn upload(
    Extension(services): Extension<Arc<Services>>,
    Path(key): Path<String>,
) -> axum::response::Response {
    match services.blobs.get(&key).await {
        Ok(Some(blob)) => (
            [(header::CONTENT_TYPE, blob.content_type)],
            blob.bytes,
        )
            .into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "file not found"),
        Err(e) => errors::service_error_to_response(e.into()),
    }
}
