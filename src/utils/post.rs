use std::collections::HashMap;

use tracing::warn;

use crate::{
    models::post::{Comment, Like, Post},
    store::Store,
    structs::{
        post::{CommentResponse, LikeResponse, PostResponse},
        user::PublicUser,
    },
};

use super::{
    app_error::{AppError, FieldErrors},
    user::{pick, public_users},
};

pub const TITLE_MAX_LEN: usize = 200;
pub const CONTENT_MAX_LEN: usize = 10_000;

pub fn check_post_data(
    auth_user_id: i64,
    title: Option<&str>,
    content: Option<&str>,
    partial: bool,
) -> Result<(), AppError> {
    let mut errors = FieldErrors::default();
    if !errors.check_text("title", title, partial, TITLE_MAX_LEN) {
        warn!("User {auth_user_id} sent a post with an invalid title");
    }
    if !errors.check_text("content", content, partial, CONTENT_MAX_LEN) {
        warn!("User {auth_user_id} sent a post with an invalid content");
    }
    errors.into_result()
}

pub fn check_comment_content(auth_user_id: i64, content: Option<&str>) -> Result<(), AppError> {
    let mut errors = FieldErrors::default();
    if !errors.check_text("content", content, false, CONTENT_MAX_LEN) {
        warn!("User {auth_user_id} sent a comment with an invalid content");
    }
    errors.into_result()
}

/// Attaches authors, comments and like counts to a page of posts.
pub async fn expand_posts(
    store: &dyn Store,
    posts: Vec<Post>,
    viewer_id: Option<i64>,
) -> Result<Vec<PostResponse>, AppError> {
    let post_ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
    let comments = store.comments_for_posts(&post_ids).await?;
    let likes = store.like_summaries(&post_ids, viewer_id).await?;
    let users = public_users(
        store,
        posts
            .iter()
            .map(|p| p.author_id)
            .chain(comments.iter().map(|c| c.author_id)),
    )
    .await?;

    let mut comments_by_post: HashMap<i64, Vec<CommentResponse>> = HashMap::new();
    for comment in comments {
        let author = pick(&users, comment.author_id)?;
        comments_by_post
            .entry(comment.post_id)
            .or_default()
            .push(comment_response(comment, author));
    }

    posts
        .into_iter()
        .map(|post| {
            let comments = comments_by_post.remove(&post.id).unwrap_or_default();
            let likes = likes.get(&post.id).copied().unwrap_or_default();
            Ok(PostResponse {
                id: post.id,
                author: pick(&users, post.author_id)?,
                title: post.title,
                content: post.content,
                created_at: post.created_at,
                updated_at: post.updated_at,
                comment_count: comments.len() as u64,
                comments,
                likes_count: likes.count,
                is_liked: likes.liked_by_viewer,
            })
        })
        .collect()
}

pub async fn expand_post(
    store: &dyn Store,
    post: Post,
    viewer_id: Option<i64>,
) -> Result<PostResponse, AppError> {
    expand_posts(store, vec![post], viewer_id)
        .await?
        .pop()
        .ok_or_else(AppError::internal_server_error)
}

fn comment_response(comment: Comment, author: PublicUser) -> CommentResponse {
    CommentResponse {
        id: comment.id,
        post: comment.post_id,
        author,
        content: comment.content,
        created_at: comment.created_at,
        updated_at: comment.updated_at,
    }
}

pub async fn expand_comments(
    store: &dyn Store,
    comments: Vec<Comment>,
) -> Result<Vec<CommentResponse>, AppError> {
    let users = public_users(store, comments.iter().map(|c| c.author_id)).await?;
    comments
        .into_iter()
        .map(|comment| {
            let author = pick(&users, comment.author_id)?;
            Ok(comment_response(comment, author))
        })
        .collect()
}

pub async fn expand_comment(store: &dyn Store, comment: Comment) -> Result<CommentResponse, AppError> {
    expand_comments(store, vec![comment])
        .await?
        .pop()
        .ok_or_else(AppError::internal_server_error)
}

pub async fn expand_likes(store: &dyn Store, likes: Vec<Like>) -> Result<Vec<LikeResponse>, AppError> {
    let users = public_users(store, likes.iter().map(|l| l.user_id)).await?;
    likes
        .into_iter()
        .map(|like| {
            Ok(LikeResponse {
                id: like.id,
                user: pick(&users, like.user_id)?,
                post: like.post_id,
                created_at: like.created_at,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_posts_need_a_title_and_content() {
        assert!(check_post_data(1, Some("Hello"), Some("World"), false).is_ok());
        assert!(check_post_data(1, None, Some("World"), false).is_err());
        assert!(check_post_data(1, Some(" "), Some("World"), false).is_err());
        assert!(check_post_data(1, Some(&"x".repeat(201)), Some("World"), false).is_err());
    }

    #[test]
    fn partial_updates_may_omit_fields() {
        assert!(check_post_data(1, None, Some("Edited"), true).is_ok());
        assert!(check_post_data(1, None, Some(""), true).is_err());
    }

    #[test]
    fn comments_cannot_be_blank() {
        assert!(check_comment_content(1, Some("nice")).is_ok());
        assert!(check_comment_content(1, Some("\n")).is_err());
        assert!(check_comment_content(1, None).is_err());
    }
}
