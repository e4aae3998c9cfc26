use axum::{extract::State, Json};
use hyper::StatusCode;
use tracing::{info, warn};

use crate::{
    extractors::app_extractors::AppJson,
    models::account::{FollowCounts, NewUser, Role},
    structs::{
        register_user::{AuthResponse, RegisterUser},
        user::UserProfile,
    },
    utils::{
        app_error::{AppError, FieldErrors},
        authentification::issue_token,
        register::{check_register_infos, hash_password, new_token_key},
    },
    AppState,
};

pub async fn register_route(
    State(app_state): State<AppState>,
    AppJson(mut register_user): AppJson<RegisterUser>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    register_user.username = register_user.username.trim().to_string();
    register_user.email = register_user.email.trim().to_lowercase();
    check_register_infos(&register_user)?;

    let mut errors = FieldErrors::default();
    if app_state
        .store
        .user_by_username(&register_user.username)
        .await?
        .is_some()
    {
        warn!("Username `{}` already used", register_user.username);
        errors.add("username", "A user with that username already exists.");
    }
    if app_state
        .store
        .user_by_email(&register_user.email)
        .await?
        .is_some()
    {
        warn!("Email address `{}` already used", register_user.email);
        errors.add("email", "A user with that email already exists.");
    }
    errors.into_result()?;

    let role = if app_state
        .config
        .is_admin_username(&register_user.username.to_lowercase())
    {
        Role::Admin
    } else {
        Role::Member
    };

    let user = app_state
        .store
        .create_user(NewUser {
            username: register_user.username,
            email: register_user.email,
            password: hash_password(&register_user.password),
            bio: register_user.bio.trim().to_string(),
            role,
            token_key: new_token_key(),
        })
        .await?;
    info!("User {} registered as {}", user.id, user.role);

    let token = issue_token(&app_state, &user);
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: UserProfile::new(&user, FollowCounts::default(), true),
        }),
    ))
}
