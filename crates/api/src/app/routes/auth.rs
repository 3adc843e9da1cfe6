use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde_json::json;

use campusstay_housing::NewStudent;
use campusstay_infra::services::{Services, VerifyOutcome};

use crate::app::dto::{
    EmailRequest, LoginForm, LoginResponse, MessageResponse, ProfileResponse,
    ResetPasswordRequest, StudentProfile, TokenQuery, UpdateProfileRequest,
};
use crate::app::errors;
use crate::authz;
use crate::context::PrincipalContext;

/// Endpoints reachable without a session.
pub fn public() -> Router {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/verify-email", get(verify_email))
        .route("/auth/resend-verification", post(resend_verification))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/login", post(login))
}

pub fn protected() -> Router {
    Router::new()
        .route("/auth/me", get(me))
        .route("/auth/update-profile", put(update_profile))
}

pub async fn register(
    Extension(services): Extension<Arc<Services>>,
    Json(body): Json<NewStudent>,
) -> axum::response::Response {
    match services.accounts.register(body).await {
        Ok(student) => (
            StatusCode::CREATED,
            Json(json!({
                "message": "Registration successful. Please check your email to verify your account.",
                "student": StudentProfile::from(&student),
            })),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn verify_email(
    Extension(services): Extension<Arc<Services>>,
    Query(query): Query<TokenQuery>,
) -> axum::response::Response {
    match services.accounts.verify_email(&query.token).await {
        Ok(VerifyOutcome::Verified) => {
            Json(MessageResponse::new("Email verified successfully. You can now log in.")).into_response()
        }
        Ok(VerifyOutcome::AlreadyVerified) => {
            Json(MessageResponse::new("Email already verified")).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn resend_verification(
    Extension(services): Extension<Arc<Services>>,
    Json(body): Json<EmailRequest>,
) -> axum::response::Response {
    match services.accounts.resend_verification(&body.email).await {
        Ok(()) => Json(MessageResponse::new(
            "If that account exists and is unverified, a new verification email has been sent.",
        ))
        .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn forgot_password(
    Extension(services): Extension<Arc<Services>>,
    Json(body): Json<EmailRequest>,
) -> axum::response::Response {
    match services.accounts.forgot_password(&body.email).await {
        Ok(()) => Json(MessageResponse::new(
            "If that email is registered, a password reset link has been sent.",
        ))
        .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn reset_password(
    Extension(services): Extension<Arc<Services>>,
    Json(body): Json<ResetPasswordRequest>,
) -> axum::response::Response {
    match services
        .accounts
        .reset_password(&body.token, &body.new_password)
        .await
    {
        Ok(()) => Json(MessageResponse::new("Password has been reset successfully")).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn login(
    Extension(services): Extension<Arc<Services>>,
    Form(form): Form<LoginForm>,
) -> axum::response::Response {
    match services.accounts.login(&form.username, &form.password).await {
        Ok(session) => Json(LoginResponse::from(session)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn me(Extension(ctx): Extension<PrincipalContext>) -> axum::response::Response {
    Json(ProfileResponse::from(ctx.principal())).into_response()
}

pub async fn update_profile(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Json(body): Json<UpdateProfileRequest>,
) -> axum::response::Response {
    let student = match authz::student(&ctx) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match services.accounts.update_profile(student.id, body.into()).await {
        Ok(updated) => Json(json!({
            "message": "Profile updated successfully",
            "student": StudentProfile::from(&updated),
        }))
        .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
