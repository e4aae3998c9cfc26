use axum::{extract::State, Json};
use axum_extra::extract::{cookie::Cookie, CookieJar};
use hyper::StatusCode;
use tracing::{info, warn};

use crate::{
    extractors::{
        app_extractors::AppJson,
        auth_extractor::{RequiredUser, SESSION_COOKIE},
    },
    models::account::UserChanges,
    structs::{
        login_user::LoginUser,
        register_user::AuthResponse,
        user::UserProfile,
    },
    utils::{
        app_error::AppError,
        authentification::issue_token,
        register::{new_token_key, verify_password},
    },
    AppState,
};

fn session_cookie(value: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, value);
    cookie.set_http_only(true);
    cookie.set_path("/");
    cookie
}

pub async fn login_route(
    State(app_state): State<AppState>,
    jar: CookieJar,
    AppJson(login_user): AppJson<LoginUser>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let username = login_user.username.trim();
    let user = app_state
        .store
        .user_by_username(username)
        .await?
        .filter(|user| verify_password(&login_user.password, &user.password));
    let Some(user) = user else {
        warn!("Failed login for `{username}`");
        return Err(AppError::bad_request(
            "Unable to log in with provided credentials.",
        ));
    };

    let token = issue_token(&app_state, &user);
    let counts = app_state.store.follow_counts(user.id).await?;
    info!("User {} logged in", user.id);

    let jar = jar.add(session_cookie(urlencoding::encode(&token).into_owned()));
    Ok((
        jar,
        Json(AuthResponse {
            token,
            user: UserProfile::new(&user, counts, true),
        }),
    ))
}

/// Rotates the caller's token key, which revokes every token issued so far.
pub async fn logout_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode), AppError> {
    app_state
        .store
        .update_user(
            auth_user.id,
            UserChanges {
                token_key: Some(new_token_key()),
                ..UserChanges::default()
            },
        )
        .await?;
    info!("User {} logged out", auth_user.id);

    Ok((
        jar.remove(session_cookie(String::new())),
        StatusCode::NO_CONTENT,
    ))
}
