use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Multipart, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;

use campusstay_core::{ApplicationId, PropertyId};
use campusstay_housing::{ApplicationStatus, Decision, NewProperty};
use campusstay_infra::services::{ImageUpload, PropertyChanges, Services};

use crate::app::dto::{self, ApplicationDocuments, ApplicationResponse, MessageResponse, PropertyResponse};
use crate::app::errors;
use crate::app::routes::common::{FilePart, FormData};
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/admin/properties", get(list_properties).post(create_property))
        .route(
            "/admin/properties/:id",
            get(get_property).put(update_property).delete(delete_property),
        )
        .route("/admin/applications", get(list_applications))
        .route(
            "/admin/applications/:id",
            get(get_application).delete(delete_application),
        )
        .route("/admin/applications/:id/documents", get(application_documents))
        .route("/admin/applications/:id/approved", post(approve_application))
        .route("/admin/applications/:id/rejected", post(reject_application))
        .route("/admin/stats", get(stats))
}

#[derive(Debug, Deserialize)]
pub struct StatusFilter {
    pub status: Option<String>,
}

fn images(parts: Vec<FilePart>) -> Vec<ImageUpload> {
    parts
        .into_iter()
        .map(|p| ImageUpload {
            file_name: p.file_name,
            content_type: p.content_type,
            bytes: p.bytes,
        })
        .collect()
}

pub async fn list_properties(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
) -> axum::response::Response {
    let admin = match authz::admin(&ctx) {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    match services.properties.list_for_admin(admin.id).await {
        Ok(list) => Json(dto::properties(&list)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Multipart: listing fields plus one to five `images`.
pub async fn create_property(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    multipart: Multipart,
) -> axum::response::Response {
    let admin = match authz::admin(&ctx) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let mut form = match FormData::read(multipart).await {
        Ok(f) => f,
        Err(resp) => return resp,
    };

    let input = match read_new_property(&form) {
        Ok(input) => input,
        Err(resp) => return resp,
    };
    let uploads = images(form.take_files("images"));

    match services.properties.create(admin.id, input, uploads).await {
        Ok(property) => (StatusCode::CREATED, Json(PropertyResponse::from(&property))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

fn read_new_property(form: &FormData) -> Result<NewProperty, axum::response::Response> {
    Ok(NewProperty {
        title: form.required("title")?,
        address: form.required("address")?,
        is_bachelor: form.flag("is_bachelor")?.unwrap_or(false),
        available_units: form.required("available_units")?,
        space_per_student: form.required("space_per_student")?,
        campus_intake: form.required("campus_intake")?,
    })
}

pub async fn get_property(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let admin = match authz::admin(&ctx) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let id: PropertyId = match errors::parse_id(&id, "property") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.properties.get_owned(admin.id, id).await {
        Ok(property) => Json(PropertyResponse::from(&property)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Multipart: any listing field, `remove_images` (repeated image URLs) and
/// `new_images`.
pub async fn update_property(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> axum::response::Response {
    let admin = match authz::admin(&ctx) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let id: PropertyId = match errors::parse_id(&id, "property") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let mut form = match FormData::read(multipart).await {
        Ok(f) => f,
        Err(resp) => return resp,
    };

    let changes = match read_changes(&mut form) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match services.properties.update(admin.id, id, changes).await {
        Ok(property) => Json(PropertyResponse::from(&property)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

fn read_changes(form: &mut FormData) -> Result<PropertyChanges, axum::response::Response> {
    Ok(PropertyChanges {
        title: form.parse("title")?,
        address: form.parse("address")?,
        is_bachelor: form.flag("is_bachelor")?,
        available_units: form.parse("available_units")?,
        space_per_student: form.parse("space_per_student")?,
        campus_intake: form.parse("campus_intake")?,
        remove_images: form.texts("remove_images"),
        new_images: images(form.take_files("new_images")),
    })
}

pub async fn delete_property(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let admin = match authz::admin(&ctx) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let id: PropertyId = match errors::parse_id(&id, "property") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.properties.delete(admin.id, id).await {
        Ok(()) => Json(MessageResponse::new("Property deleted")).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_applications(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Query(filter): Query<StatusFilter>,
) -> axum::response::Response {
    let admin = match authz::admin(&ctx) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let status = match filter.status.as_deref().map(str::parse::<ApplicationStatus>) {
        None => None,
        Some(Ok(s)) => Some(s),
        Some(Err(e)) => return errors::service_error_to_response(e.into()),
    };

    match services.applications.admin_list(admin.id, status).await {
        Ok(views) => Json(
            views
                .iter()
                .map(ApplicationResponse::for_admin)
                .collect::<Vec<_>>(),
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
    let admin = match authz::admin(&ctx) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let id: ApplicationId = match errors::parse_id(&id, "application") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.applications.admin_get(admin.id, id).await {
        Ok(view) => Json(ApplicationResponse::for_admin(&view)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn application_documents(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let admin = match authz::admin(&ctx) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let id: ApplicationId = match errors::parse_id(&id, "application") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.applications.admin_get(admin.id, id).await {
        Ok(view) => Json(ApplicationDocuments::from(&view)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn approve_application(
    services: Extension<Arc<Services>>,
    ctx: Extension<PrincipalContext>,
    id: Path<String>,
) -> axum::response::Response {
    decide(services, ctx, id, Decision::Approve).await
}

pub async fn reject_application(
    services: Extension<Arc<Services>>,
    ctx: Extension<PrincipalContext>,
    id: Path<String>,
) -> axum::response::Response {
    decide(services, ctx, id, Decision::Reject).await
}

async fn decide(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    decision: Decision,
) -> axum::response::Response {
    let admin = match authz::admin(&ctx) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let id: ApplicationId = match errors::parse_id(&id, "application") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.applications.decide(admin.id, id, decision).await {
        Ok(view) => Json(serde_json::json!({
            "message": format!("Application {}", view.application.status),
            "application": ApplicationResponse::for_admin(&view),
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
    let admin = match authz::admin(&ctx) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let id: ApplicationId = match errors::parse_id(&id, "application") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.applications.delete_as_admin(admin.id, id).await {
        Ok(()) => Json(MessageResponse::new("Application deleted")).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn stats(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
) -> axum::response::Response {
    let admin = match authz::admin(&ctx) {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    match services.applications.stats(admin.id).await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
