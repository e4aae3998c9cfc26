use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    Json,
};
use hyper::{Method, StatusCode};
use tracing::{info, warn};

use crate::{
    extractors::{
        app_extractors::{AppJson, AppPath},
        auth_extractor::{AuthUser, RequiredUser},
    },
    models::post::{NewPost, Post, PostChanges},
    structs::post::{PostPayload, PostResponse},
    utils::{
        app_error::AppError,
        filters::{PostFilter, TimestampOrder},
        ordering::{Direction, OrderBy},
        pagination::{PaginatedResponse, PaginationParams},
        post::{check_post_data, expand_post, expand_posts},
    },
    AppState,
};

pub async fn existing_post(app_state: &AppState, id: i64) -> Result<Post, AppError> {
    app_state
        .store
        .post_by_id(id)
        .await?
        .ok_or_else(AppError::not_found)
}

pub async fn list_posts_route(
    State(app_state): State<AppState>,
    AuthUser(auth_user): AuthUser,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<PaginatedResponse<PostResponse>>, AppError> {
    let filter = PostFilter::from_query(&params)?;
    let order = OrderBy::from_query(&params, &[(TimestampOrder::CreatedAt, Direction::Desc)]);
    let page = PaginationParams::from_query(&params)?;

    let posts = app_state.store.list_posts(&filter, &order, page).await?;
    let viewer = auth_user.map(|u| u.id);
    let results = expand_posts(app_state.store.as_ref(), posts.items, viewer).await?;
    Ok(Json(PaginatedResponse::new(page, posts.count, results)?))
}

pub async fn create_post_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    AppJson(post): AppJson<PostPayload>,
) -> Result<(StatusCode, Json<PostResponse>), AppError> {
    let title = post.title.as_deref().map(str::trim);
    let content = post.content.as_deref().map(str::trim);
    check_post_data(auth_user.id, title, content, false)?;

    let post = app_state
        .store
        .create_post(NewPost {
            author_id: auth_user.id,
            title: title.unwrap_or_default().to_string(),
            content: content.unwrap_or_default().to_string(),
        })
        .await?;
    info!("User {} published post {}", auth_user.id, post.id);

    let post = expand_post(app_state.store.as_ref(), post, Some(auth_user.id)).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn get_post_route(
    State(app_state): State<AppState>,
    AuthUser(auth_user): AuthUser,
    AppPath(id): AppPath<i64>,
) -> Result<Json<PostResponse>, AppError> {
    let post = existing_post(&app_state, id).await?;
    let viewer = auth_user.map(|u| u.id);
    Ok(Json(expand_post(app_state.store.as_ref(), post, viewer).await?))
}

/// `PUT` replaces both fields, `PATCH` only the ones sent.
pub async fn update_post_route(
    State(app_state): State<AppState>,
    method: Method,
    RequiredUser(auth_user): RequiredUser,
    AppPath(id): AppPath<i64>,
    AppJson(changes): AppJson<PostPayload>,
) -> Result<Json<PostResponse>, AppError> {
    let post = existing_post(&app_state, id).await?;
    if post.author_id != auth_user.id {
        warn!("User {} tried to edit post {}", auth_user.id, post.id);
        return Err(AppError::forbidden_error());
    }

    let title = changes.title.as_deref().map(str::trim);
    let content = changes.content.as_deref().map(str::trim);
    check_post_data(auth_user.id, title, content, method == Method::PATCH)?;

    let post = app_state
        .store
        .update_post(
            post.id,
            PostChanges {
                title: title.map(str::to_string),
                content: content.map(str::to_string),
            },
        )
        .await?;
    info!("User {} edited post {}", auth_user.id, post.id);
    Ok(Json(
        expand_post(app_state.store.as_ref(), post, Some(auth_user.id)).await?,
    ))
}

pub async fn delete_post_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    AppPath(id): AppPath<i64>,
) -> Result<StatusCode, AppError> {
    let post = existing_post(&app_state, id).await?;
    if post.author_id != auth_user.id {
        warn!("User {} tried to delete post {}", auth_user.id, post.id);
        return Err(AppError::forbidden_error());
    }
    app_state.store.delete_post(post.id).await?;
    info!("User {} deleted post {}", auth_user.id, post.id);
    Ok(StatusCode::NO_CONTENT)
}
