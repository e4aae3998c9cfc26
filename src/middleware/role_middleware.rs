use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::{
    extractors::auth_extractor::AuthUser,
    models::account::Role,
    utils::app_error::AppError,
    AppState,
};

pub const ADMIN_ONLY: &[Role] = &[Role::Admin];
pub const LIBRARIAN_ONLY: &[Role] = &[Role::Librarian];
pub const MEMBER_ONLY: &[Role] = &[Role::Member];
pub const LIBRARY_STAFF: &[Role] = &[Role::Librarian, Role::Admin];

/// State of [`role_middleware`]: the roles allowed through one route.
#[derive(Clone)]
pub struct RoleGate {
    pub app_state: AppState,
    pub allowed: &'static [Role],
}

impl RoleGate {
    pub fn new(app_state: AppState, allowed: &'static [Role]) -> Self {
        Self { app_state, allowed }
    }
}

/// Lets the request through only for an authenticated user holding one of
/// the gate's roles. The user is stored in the request extensions for the
/// handler's [`AuthUser`].
pub async fn role_middleware(
    State(gate): State<RoleGate>,
    request: Request<Body>,
    next: Next<Body>,
) -> Result<Response, AppError> {
    let (mut parts, body) = request.into_parts();
    let user = AuthUser::from_request_parts(&mut parts, &gate.app_state)
        .await?
        .required()?;

    if !gate.allowed.contains(&user.role) {
        warn!(
            "User {} with role {} tried to reach {} {}",
            user.id, user.role, parts.method, parts.uri
        );
        return Err(AppError::forbidden_error());
    }

    parts.extensions.insert(user);
    Ok(next.run(Request::from_parts(parts, body)).await)
}
