use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    Json,
};
use hyper::StatusCode;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::{
    extractors::{app_extractors::AppPath, auth_extractor::RequiredUser},
    fan_out,
    store::StoreError,
    structs::post::LikeResponse,
    utils::{
        app_error::AppError,
        pagination::{PaginatedResponse, PaginationParams},
        post::expand_likes,
    },
    AppState,
};

use super::posts_routes::existing_post;

pub async fn like_post_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    AppPath(post_id): AppPath<i64>,
) -> Result<(StatusCode, Json<LikeResponse>), AppError> {
    let post = existing_post(&app_state, post_id).await?;

    let (like, notification) = app_state
        .store
        .create_like(
            auth_user.id,
            post.id,
            fan_out::recipient_for(auth_user.id, post.author_id),
        )
        .await?;
    info!("User {} liked post {}", auth_user.id, post.id);
    fan_out::publish_optional(&app_state, notification).await;

    let like = expand_likes(app_state.store.as_ref(), vec![like])
        .await?
        .pop()
        .ok_or_else(AppError::internal_server_error)?;
    Ok((StatusCode::CREATED, Json(like)))
}

pub async fn unlike_post_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    AppPath(post_id): AppPath<i64>,
) -> Result<Json<Value>, AppError> {
    let post = existing_post(&app_state, post_id).await?;

    match app_state.store.delete_like(auth_user.id, post.id).await {
        Ok(()) => {}
        Err(StoreError::NotFound) => {
            warn!("User {} unliked post {} without liking it", auth_user.id, post.id);
            return Err(AppError::bad_request("You have not liked this post."));
        }
        Err(e) => return Err(e.into()),
    }
    info!("User {} unliked post {}", auth_user.id, post.id);
    Ok(Json(json!({ "detail": "Post unliked." })))
}

pub async fn post_likes_route(
    State(app_state): State<AppState>,
    AppPath(post_id): AppPath<i64>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<PaginatedResponse<LikeResponse>>, AppError> {
    let post = existing_post(&app_state, post_id).await?;
    let page = PaginationParams::from_query(&params)?;
    let likes = app_state.store.likes_for_post(post.id, page).await?;
    let results = expand_likes(app_state.store.as_ref(), likes.items).await?;
    Ok(Json(PaginatedResponse::new(page, likes.count, results)?))
}
