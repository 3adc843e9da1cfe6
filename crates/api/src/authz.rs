//! Role gates for handlers.
//!
//! Handlers call these before touching a service so that a principal of the
//! wrong kind is refused with `forbidden` regardless of the route.

use axum::response::Response;

use campusstay_housing::{Admin, Student};

use crate::app::errors;
use crate::context::PrincipalContext;

pub fn student(ctx: &PrincipalContext) -> Result<&Student, Response> {
    ctx.principal()
        .require_student()
        .map_err(|e| errors::service_error_to_response(e.into()))
}

pub fn admin(ctx: &PrincipalContext) -> Result<&Admin, Response> {
    ctx.principal()
        .require_admin()
        .map_err(|e| errors::service_error_to_response(e.into()))
}
