use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    Json,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::{
    extractors::{app_extractors::AppPath, auth_extractor::RequiredUser},
    fan_out,
    store::StoreError,
    structs::post::PostResponse,
    utils::{
        app_error::AppError,
        filters::{PostFilter, TimestampOrder},
        ordering::{Direction, OrderBy},
        pagination::{PaginatedResponse, PaginationParams},
        post::expand_posts,
    },
    AppState,
};

pub async fn follow_user_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    AppPath(user_id): AppPath<i64>,
) -> Result<Json<Value>, AppError> {
    let Some(followed) = app_state.store.user_by_id(user_id).await? else {
        return Err(AppError::not_found());
    };
    if followed.id == auth_user.id {
        warn!("User {} tried to follow themselves", auth_user.id);
        return Err(AppError::bad_request("You cannot follow yourself."));
    }

    let (_, notification) = app_state
        .store
        .create_follow(auth_user.id, followed.id)
        .await?;
    info!("User {} follows user {}", auth_user.id, followed.id);
    fan_out::publish(&app_state, notification).await;

    Ok(Json(
        json!({ "detail": format!("You are now following {}.", followed.username) }),
    ))
}

pub async fn unfollow_user_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    AppPath(user_id): AppPath<i64>,
) -> Result<Json<Value>, AppError> {
    let Some(followed) = app_state.store.user_by_id(user_id).await? else {
        return Err(AppError::not_found());
    };

    match app_state.store.delete_follow(auth_user.id, followed.id).await {
        Ok(()) => {}
        Err(StoreError::NotFound) => {
            warn!("User {} doesn't follow user {}", auth_user.id, followed.id);
            return Err(AppError::bad_request("You are not following this user."));
        }
        Err(e) => return Err(e.into()),
    }
    info!("User {} unfollowed user {}", auth_user.id, followed.id);

    Ok(Json(
        json!({ "detail": format!("You have unfollowed {}.", followed.username) }),
    ))
}

/// Posts of the users the caller follows, newest first.
pub async fn feed_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<PaginatedResponse<PostResponse>>, AppError> {
    let page = PaginationParams::from_query(&params)?;
    let filter = PostFilter {
        authors_in: Some(app_state.store.following_ids(auth_user.id).await?),
        ..PostFilter::default()
    };
    let order = OrderBy::new(vec![(TimestampOrder::CreatedAt, Direction::Desc)]);

    let posts = app_state.store.list_posts(&filter, &order, page).await?;
    let results = expand_posts(app_state.store.as_ref(), posts.items, Some(auth_user.id)).await?;
    Ok(Json(PaginatedResponse::new(page, posts.count, results)?))
}
