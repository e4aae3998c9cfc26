use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use axum_extra::extract::CookieJar;
use tracing::warn;

use crate::{
    models::account::User,
    utils::{app_error::AppError, authentification::authentificate},
    AppState,
};

pub const SESSION_COOKIE: &str = "session";

/// The caller, if any. Credentials come from an `Authorization: Token <t>`
/// (or `Bearer <t>`) header, else from the `session` cookie.
pub struct AuthUser(pub Option<User>);

impl AuthUser {
    /// The caller, or a 401 for anonymous requests.
    pub fn required(self) -> Result<User, AppError> {
        self.0.ok_or_else(|| {
            warn!("User not connected");
            AppError::you_have_to_be_connected_to_perform_this_action_error()
        })
    }
}

fn header_token(parts: &Parts) -> Option<Result<String, AppError>> {
    let header = parts.headers.get(AUTHORIZATION)?;
    let Ok(header) = header.to_str() else {
        warn!("Non ASCII authorization header");
        return Some(Err(AppError::invalid_token()));
    };
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("token") && !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(Ok(token.trim().to_string()))
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // Already resolved by the role gate.
        if let Some(user) = parts.extensions.get::<User>() {
            return Ok(AuthUser(Some(user.clone())));
        }

        let app_state = AppState::from_ref(state);

        if let Some(token) = header_token(parts) {
            let token = token?;
            return match authentificate(&app_state, &token).await? {
                Some(user) => Ok(AuthUser(Some(user))),
                None => {
                    warn!("Invalid token in authorization header");
                    Err(AppError::invalid_token())
                }
            };
        }

        let cookies = CookieJar::from_headers(&parts.headers);
        let Some(cookie) = cookies.get(SESSION_COOKIE) else {
            return Ok(AuthUser(None));
        };
        let token = match urlencoding::decode(cookie.value()) {
            Ok(token) => token.into_owned(),
            Err(e) => {
                warn!("Cannot decode session cookie : {e}");
                return Ok(AuthUser(None));
            }
        };
        Ok(AuthUser(authentificate(&app_state, &token).await?))
    }
}

/// An authenticated caller. Rejects anonymous requests with a 401 before any
/// body extractor gets to run.
pub struct RequiredUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for RequiredUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?.required()?;
        Ok(RequiredUser(user))
    }
}
