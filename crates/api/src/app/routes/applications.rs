use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Multipart, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde_json::json;

use campusstay_core::{ApplicationId, PropertyId};
use campusstay_housing::{DocumentKind, DocumentUpload};
use campusstay_infra::services::Services;

use crate::app::dto::{ApplicationResponse, CreateApplicationRequest, MessageResponse};
use crate::app::errors;
use crate::app::routes::common::FormData;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route(
            "/applications/my-applications",
            get(list_applications).post(create_application),
        )
        .route(
            "/applications/my-applications/:id",
            get(get_application)
                .put(update_application)
                .delete(delete_application),
        )
}

pub async fn list_applications(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
) -> axum::response::Response {
    let student = match authz::student(&ctx) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match services.applications.list_mine(student.id).await {
        Ok(views) => Json(
            views
                .iter()
                .map(ApplicationResponse::for_student)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn create_application(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Json(body): Json<CreateApplicationRequest>,
) -> axum::response::Response {
    let student = match authz::student(&ctx) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let property_id: PropertyId = match errors::parse_id(&body.property_id, "property") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .applications
        .create(student, property_id, &body.notes)
        .await
    {
        Ok(view) => (
            StatusCode::CREATED,
            Json(json!({
                "message": "Application submitted successfully!",
                "application": ApplicationResponse::for_student(&view),
            })),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_application(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let student = match authz::student(&ctx) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let id: ApplicationId = match errors::parse_id(&id, "application") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.applications.get_mine(student.id, id).await {
        Ok(view) => Json(ApplicationResponse::for_student(&view)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Multipart: optional `id_copy` and `proof_of_registration` PDFs plus a
/// `funding_approved` flag (absent means false).
pub async fn update_application(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> axum::response::Response {
    let student = match authz::student(&ctx) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let id: ApplicationId = match errors::parse_id(&id, "application") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let mut form = match FormData::read(multipart).await {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    let funding_approved = match form.flag("funding_approved") {
        Ok(flag) => flag.unwrap_or(false),
        Err(resp) => return resp,
    };

    let mut uploads = Vec::new();
    for kind in [DocumentKind::ProofOfRegistration, DocumentKind::IdCopy] {
        for part in form.take_files(kind.field_name()) {
            uploads.push(DocumentUpload {
                kind,
                file_name: part.file_name,
                content_type: part.content_type,
                bytes: part.bytes,
            });
        }
    }

    match services
        .applications
        .attach_documents(student, id, uploads, funding_approved)
        .await
    {
        Ok(view) => Json(json!({
            "message": "Application updated successfully",
            "application": ApplicationResponse::for_student(&view),
        }))
        .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn delete_application(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let student = match authz::student(&ctx) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let id: ApplicationId = match errors::parse_id(&id, "application") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.applications.delete_as_student(student.id, id).await {
        Ok(()) => Json(MessageResponse::new("Application withdrawn")).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
