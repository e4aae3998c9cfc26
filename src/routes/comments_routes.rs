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
        auth_extractor::RequiredUser,
    },
    fan_out,
    models::{
        account::User,
        post::{Comment, NewComment, Post},
    },
    structs::post::{CommentPayload, CommentResponse},
    utils::{
        app_error::AppError,
        filters::{CommentFilter, TimestampOrder},
        ordering::{Direction, OrderBy},
        pagination::{PaginatedResponse, PaginationParams},
        post::{check_comment_content, expand_comment, expand_comments},
    },
    AppState,
};

use super::posts_routes::existing_post;

async fn existing_comment(app_state: &AppState, id: i64) -> Result<Comment, AppError> {
    app_state
        .store
        .comment_by_id(id)
        .await?
        .ok_or_else(AppError::not_found)
}

/// Stores the comment and notifies the post's author.
async fn comment_on(
    app_state: &AppState,
    auth_user: &User,
    post: &Post,
    content: Option<&str>,
) -> Result<CommentResponse, AppError> {
    let content = content.map(str::trim);
    check_comment_content(auth_user.id, content)?;

    let (comment, notification) = app_state
        .store
        .create_comment(
            NewComment {
                post_id: post.id,
                author_id: auth_user.id,
                content: content.unwrap_or_default().to_string(),
            },
            fan_out::recipient_for(auth_user.id, post.author_id),
        )
        .await?;
    info!("User {} commented on post {}", auth_user.id, post.id);
    fan_out::publish_optional(app_state, notification).await;

    expand_comment(app_state.store.as_ref(), comment).await
}

pub async fn list_comments_route(
    State(app_state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<PaginatedResponse<CommentResponse>>, AppError> {
    let filter = CommentFilter::from_query(&params)?;
    let order = OrderBy::from_query(&params, &[(TimestampOrder::CreatedAt, Direction::Desc)]);
    let page = PaginationParams::from_query(&params)?;

    let comments = app_state.store.list_comments(&filter, &order, page).await?;
    let results = expand_comments(app_state.store.as_ref(), comments.items).await?;
    Ok(Json(PaginatedResponse::new(page, comments.count, results)?))
}

pub async fn create_comment_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    AppJson(comment): AppJson<CommentPayload>,
) -> Result<(StatusCode, Json<CommentResponse>), AppError> {
    let Some(post_id) = comment.post else {
        return Err(AppError::field_error("post", "This field is required."));
    };
    let Some(post) = app_state.store.post_by_id(post_id).await? else {
        warn!("User {} commented on unknown post {post_id}", auth_user.id);
        return Err(AppError::field_error(
            "post",
            format!("Invalid pk \"{post_id}\" - object does not exist."),
        ));
    };
    let comment = comment_on(&app_state, &auth_user, &post, comment.content.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// `POST /api/posts/:id/comment`
pub async fn comment_on_post_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    AppPath(post_id): AppPath<i64>,
    AppJson(comment): AppJson<CommentPayload>,
) -> Result<(StatusCode, Json<CommentResponse>), AppError> {
    let post = existing_post(&app_state, post_id).await?;
    let comment = comment_on(&app_state, &auth_user, &post, comment.content.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn get_comment_route(
    State(app_state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<CommentResponse>, AppError> {
    let comment = existing_comment(&app_state, id).await?;
    Ok(Json(expand_comment(app_state.store.as_ref(), comment).await?))
}

/// Only the content can change; a comment never moves to another post.
pub async fn update_comment_route(
    State(app_state): State<AppState>,
    method: Method,
    RequiredUser(auth_user): RequiredUser,
    AppPath(id): AppPath<i64>,
    AppJson(changes): AppJson<CommentPayload>,
) -> Result<Json<CommentResponse>, AppError> {
    let comment = existing_comment(&app_state, id).await?;
    if comment.author_id != auth_user.id {
        warn!("User {} tried to edit comment {}", auth_user.id, comment.id);
        return Err(AppError::forbidden_error());
    }
    if changes.post.is_some_and(|post| post != comment.post_id) {
        warn!("User {} tried to move comment {}", auth_user.id, comment.id);
        return Err(AppError::field_error(
            "post",
            "The post of a comment cannot be changed.",
        ));
    }

    let content = changes.content.as_deref().map(str::trim);
    let comment = match content {
        None if method == Method::PATCH => comment,
        _ => {
            check_comment_content(auth_user.id, content)?;
            let content = content.unwrap_or_default().to_string();
            let comment = app_state.store.update_comment(comment.id, content).await?;
            info!("User {} edited comment {}", auth_user.id, comment.id);
            comment
        }
    };
    Ok(Json(expand_comment(app_state.store.as_ref(), comment).await?))
}

pub async fn delete_comment_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    AppPath(id): AppPath<i64>,
) -> Result<StatusCode, AppError> {
    let comment = existing_comment(&app_state, id).await?;
    if comment.author_id != auth_user.id {
        warn!("User {} tried to delete comment {}", auth_user.id, comment.id);
        return Err(AppError::forbidden_error());
    }
    app_state.store.delete_comment(comment.id).await?;
    info!("User {} deleted comment {}", auth_user.id, comment.id);
    Ok(StatusCode::NO_CONTENT)
}
