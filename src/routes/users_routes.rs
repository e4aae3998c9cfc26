use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    Json,
};
use hyper::StatusCode;
use tracing::{info, warn};

use crate::{
    extractors::{
        app_extractors::{AppJson, AppPath},
        auth_extractor::RequiredUser,
    },
    models::account::{Role, User, UserChanges},
    structs::user::{PublicUser, RoleUpdate, UpdateUser, UserProfile},
    utils::{
        app_error::{AppError, FieldErrors},
        filters::{UserFilter, UserOrder},
        ordering::{Direction, OrderBy},
        pagination::{PaginatedResponse, PaginationParams},
        register::check_email_address,
    },
    AppState,
};

const BIO_MAX_LEN: usize = 500;

async fn existing_user(app_state: &AppState, id: i64) -> Result<User, AppError> {
    app_state
        .store
        .user_by_id(id)
        .await?
        .ok_or_else(AppError::not_found)
}

async fn profile(app_state: &AppState, user: &User, with_email: bool) -> Result<UserProfile, AppError> {
    let counts = app_state.store.follow_counts(user.id).await?;
    Ok(UserProfile::new(user, counts, with_email))
}

pub async fn list_users_route(
    State(app_state): State<AppState>,
    _: RequiredUser,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<PaginatedResponse<PublicUser>>, AppError> {
    let filter = UserFilter::from_query(&params);
    let order = OrderBy::from_query(&params, &[(UserOrder::Username, Direction::Asc)]);
    let page = PaginationParams::from_query(&params)?;

    let users = app_state.store.list_users(&filter, &order, page).await?;
    let results = users.items.iter().map(PublicUser::from).collect();
    Ok(Json(PaginatedResponse::new(page, users.count, results)?))
}

pub async fn profile_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
) -> Result<Json<UserProfile>, AppError> {
    Ok(Json(profile(&app_state, &auth_user, true).await?))
}

pub async fn get_user_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    AppPath(id): AppPath<i64>,
) -> Result<Json<UserProfile>, AppError> {
    let user = existing_user(&app_state, id).await?;
    Ok(Json(profile(&app_state, &user, user.id == auth_user.id).await?))
}

pub async fn update_user_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    AppPath(id): AppPath<i64>,
    AppJson(update): AppJson<UpdateUser>,
) -> Result<Json<UserProfile>, AppError> {
    let user = existing_user(&app_state, id).await?;
    if user.id != auth_user.id {
        warn!("User {} tried to edit user {}", auth_user.id, user.id);
        return Err(AppError::forbidden_error());
    }

    let email = update.email.map(|e| e.trim().to_lowercase());
    let bio = update.bio.map(|b| b.trim().to_string());

    let mut errors = FieldErrors::default();
    if let Some(email) = &email {
        check_email_address(email, &mut errors);
        if errors.is_empty() {
            let taken = app_state
                .store
                .user_by_email(email)
                .await?
                .is_some_and(|other| other.id != user.id);
            if taken {
                errors.add("email", "A user with that email already exists.");
            }
        }
    }
    if bio.as_ref().is_some_and(|b| b.chars().count() > BIO_MAX_LEN) {
        errors.add(
            "bio",
            format!("Ensure this field has no more than {BIO_MAX_LEN} characters."),
        );
    }
    errors.into_result()?;

    let user = app_state
        .store
        .update_user(
            user.id,
            UserChanges {
                email,
                bio,
                ..UserChanges::default()
            },
        )
        .await?;
    info!("User {} updated their profile", user.id);
    Ok(Json(profile(&app_state, &user, true).await?))
}

/// The account owner or an admin may delete an account.
pub async fn delete_user_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    AppPath(id): AppPath<i64>,
) -> Result<StatusCode, AppError> {
    let user = existing_user(&app_state, id).await?;
    if user.id != auth_user.id && auth_user.role != Role::Admin {
        warn!("User {} tried to delete user {}", auth_user.id, user.id);
        return Err(AppError::forbidden_error());
    }
    app_state.store.delete_user(user.id).await?;
    info!("User {} deleted by {}", user.id, auth_user.id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_role_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    AppPath(id): AppPath<i64>,
    AppJson(update): AppJson<RoleUpdate>,
) -> Result<Json<UserProfile>, AppError> {
    let user = existing_user(&app_state, id).await?;

    let role = match update.role.as_deref().map(str::parse::<Role>) {
        Some(Ok(role)) => role,
        Some(Err(e)) => {
            warn!("Admin {} sent an invalid role : {e}", auth_user.id);
            return Err(AppError::field_error(
                "role",
                format!("\"{}\" is not a valid choice.", update.role.as_deref().unwrap_or_default()),
            ));
        }
        None => return Err(AppError::field_error("role", "This field is required.")),
    };

    let user = app_state
        .store
        .update_user(
            user.id,
            UserChanges {
                role: Some(role),
                ..UserChanges::default()
            },
        )
        .await?;
    info!("Admin {} made user {} a {}", auth_user.id, user.id, role);
    Ok(Json(profile(&app_state, &user, false).await?))
}
