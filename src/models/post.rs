use time::OffsetDateTime;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub author_id: i64,
    pub title: String,
    pub content: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

pub struct NewPost {
    pub author_id: i64,
    pub title: String,
    pub content: String,
}

#[derive(Default)]
pub struct PostChanges {
    pub title: Option<String>,
    pub content: Option<String>,
}

/// The parent post of a comment never changes once the comment exists.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author_id: i64,
    pub content: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

pub struct NewComment {
    pub post_id: i64,
    pub author_id: i64,
    pub content: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Like {
    pub id: i64,
    pub user_id: i64,
    pub post_id: i64,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LikeSummary {
    pub count: u64,
    pub liked_by_viewer: bool,
}
