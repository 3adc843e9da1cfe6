use std::str::FromStr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use campusstay_infra::services::ServiceError;

pub fn status_for(kind: &str) -> StatusCode {
    match kind {
        "validation_error" | "invalid_document" => StatusCode::BAD_REQUEST,
        "expired_token" | "invalid_token" | "wrong_purpose" => StatusCode::BAD_REQUEST,
        "not_found" => StatusCode::NOT_FOUND,
        "conflict" | "invalid_state" | "exhausted" => StatusCode::CONFLICT,
        "unverified" | "email_not_verified" | "forbidden" => StatusCode::FORBIDDEN,
        "bad_credentials" | "invalid_session" => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn service_error_to_response(err: ServiceError) -> Response {
    let kind = err.kind();
    let status = status_for(kind);
    if status.is_server_error() {
        error!(error = %err, kind, "request failed");
        return json_error(status, kind, "internal server error");
    }
    json_error(status, kind, err.to_string())
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path id, answering `400 validation_error` on garbage.
pub fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, Response> {
    raw.parse::<T>().map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            format!("invalid {what} id"),
        )
    })
}

pub fn bad_request(message: impl Into<String>) -> Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", message)
}
