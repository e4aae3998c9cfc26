use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::user::PublicUser;

#[derive(Deserialize)]
pub struct PostPayload {
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub id: i64,
    pub author: PublicUser,
    pub title: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub comments: Vec<CommentResponse>,
    pub comment_count: u64,
    pub likes_count: u64,
    pub is_liked: bool,
}

/// `post` is only read on creation through `/api/comments`.
#[derive(Deserialize)]
pub struct CommentPayload {
    pub post: Option<i64>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentResponse {
    pub id: i64,
    pub post: i64,
    pub author: PublicUser,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub id: i64,
    pub user: PublicUser,
    pub post: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
