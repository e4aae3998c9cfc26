//! Repository interfaces over the relational schema in `migrations/`.
//!
//! Routes only ever talk to `dyn Store`; [`MemoryStore`] backs tests and
//! database-less runs, [`PgStore`] backs production.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    models::{
        account::{Follow, FollowCounts, NewUser, User, UserChanges},
        catalog::{Author, Book, BookChanges, Librarian, Library, NewAuthor, NewBook, Stats},
        notification::Notification,
        post::{Comment, Like, LikeSummary, NewComment, NewPost, Post, PostChanges},
    },
    utils::{
        filters::{
            AuthorFilter, AuthorOrder, BookFilter, BookOrder, CommentFilter, NotificationFilter,
            PostFilter, TimestampOrder, UserFilter, UserOrder,
        },
        ordering::OrderBy,
        pagination::{Page, PaginationParams},
    },
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,

    /// A uniqueness rule would be broken; the message is client facing.
    #[error("{0}")]
    Conflict(String),

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when the username or e-mail is taken.
    async fn create_user(&self, new_user: NewUser) -> StoreResult<User>;
    async fn user_by_id(&self, id: i64) -> StoreResult<Option<User>>;
    async fn user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn user_by_token_key(&self, token_key: &str) -> StoreResult<Option<User>>;
    async fn users_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<User>>;
    async fn list_users(
        &self,
        filter: &UserFilter,
        order: &OrderBy<UserOrder>,
        page: PaginationParams,
    ) -> StoreResult<Page<User>>;
    async fn update_user(&self, id: i64, changes: UserChanges) -> StoreResult<User>;
    /// Cascades to everything the user authored or received.
    async fn delete_user(&self, id: i64) -> StoreResult<()>;

    /// Inserts the follow edge and the follow notification together.
    async fn create_follow(
        &self,
        follower_id: i64,
        followed_id: i64,
    ) -> StoreResult<(Follow, Notification)>;
    async fn delete_follow(&self, follower_id: i64, followed_id: i64) -> StoreResult<()>;
    async fn following_ids(&self, follower_id: i64) -> StoreResult<Vec<i64>>;
    async fn follow_counts(&self, user_id: i64) -> StoreResult<FollowCounts>;
}

#[async_trait]
pub trait SocialStore: Send + Sync {
    async fn create_post(&self, new_post: NewPost) -> StoreResult<Post>;
    async fn post_by_id(&self, id: i64) -> StoreResult<Option<Post>>;
    async fn list_posts(
        &self,
        filter: &PostFilter,
        order: &OrderBy<TimestampOrder>,
        page: PaginationParams,
    ) -> StoreResult<Page<Post>>;
    async fn update_post(&self, id: i64, changes: PostChanges) -> StoreResult<Post>;
    async fn delete_post(&self, id: i64) -> StoreResult<()>;

    /// Inserts the comment and, when `notify` names a recipient, its
    /// notification in the same transaction.
    async fn create_comment(
        &self,
        new_comment: NewComment,
        notify: Option<i64>,
    ) -> StoreResult<(Comment, Option<Notification>)>;
    async fn comment_by_id(&self, id: i64) -> StoreResult<Option<Comment>>;
    async fn list_comments(
        &self,
        filter: &CommentFilter,
        order: &OrderBy<TimestampOrder>,
        page: PaginationParams,
    ) -> StoreResult<Page<Comment>>;
    /// Newest first, grouped by nothing; callers bucket them per post.
    async fn comments_for_posts(&self, post_ids: &[i64]) -> StoreResult<Vec<Comment>>;
    async fn update_comment(&self, id: i64, content: String) -> StoreResult<Comment>;
    async fn delete_comment(&self, id: i64) -> StoreResult<()>;

    /// Check-and-insert is atomic: a second like by the same user on the
    /// same post is a `Conflict`, however the requests interleave.
    async fn create_like(
        &self,
        user_id: i64,
        post_id: i64,
        notify: Option<i64>,
    ) -> StoreResult<(Like, Option<Notification>)>;
    /// `NotFound` when the user has not liked the post.
    async fn delete_like(&self, user_id: i64, post_id: i64) -> StoreResult<()>;
    async fn likes_for_post(&self, post_id: i64, page: PaginationParams) -> StoreResult<Page<Like>>;
    async fn like_summaries(
        &self,
        post_ids: &[i64],
        viewer_id: Option<i64>,
    ) -> StoreResult<HashMap<i64, LikeSummary>>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn list_notifications(
        &self,
        recipient_id: i64,
        filter: &NotificationFilter,
        page: PaginationParams,
    ) -> StoreResult<Page<Notification>>;
    async fn notification_by_id(&self, id: i64) -> StoreResult<Option<Notification>>;
    async fn mark_read(&self, id: i64) -> StoreResult<Notification>;
    /// Returns how many notifications flipped to read.
    async fn mark_all_read(&self, recipient_id: i64) -> StoreResult<u64>;
    async fn unread_count(&self, recipient_id: i64) -> StoreResult<u64>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn create_author(&self, new_author: NewAuthor) -> StoreResult<Author>;
    async fn author_by_id(&self, id: i64) -> StoreResult<Option<Author>>;
    async fn existing_author_ids(&self, ids: &[i64]) -> StoreResult<Vec<i64>>;
    async fn list_authors(
        &self,
        filter: &AuthorFilter,
        order: &OrderBy<AuthorOrder>,
        page: PaginationParams,
    ) -> StoreResult<Page<Author>>;
    async fn update_author(&self, id: i64, name: String) -> StoreResult<Author>;
    async fn delete_author(&self, id: i64) -> StoreResult<()>;

    /// All-or-nothing insert; a missing author fails the whole batch.
    async fn create_books(&self, new_books: Vec<NewBook>) -> StoreResult<Vec<Book>>;
    async fn book_by_id(&self, id: i64) -> StoreResult<Option<Book>>;
    async fn list_books(
        &self,
        filter: &BookFilter,
        order: &OrderBy<BookOrder>,
        page: PaginationParams,
    ) -> StoreResult<Page<Book>>;
    /// Ordered by title.
    async fn books_for_authors(&self, author_ids: &[i64]) -> StoreResult<Vec<Book>>;
    async fn update_book(&self, id: i64, changes: BookChanges) -> StoreResult<Book>;
    async fn delete_book(&self, id: i64) -> StoreResult<()>;
    /// Returns how many of `ids` existed.
    async fn delete_books(&self, ids: &[i64]) -> StoreResult<u64>;
}

#[async_trait]
pub trait LibraryStore: Send + Sync {
    /// `Conflict` when the name is taken.
    async fn create_library(&self, name: String) -> StoreResult<Library>;
    async fn library_by_id(&self, id: i64) -> StoreResult<Option<Library>>;
    async fn list_libraries(&self, page: PaginationParams) -> StoreResult<Page<Library>>;
    async fn library_books(&self, library_id: i64) -> StoreResult<Vec<Book>>;
    /// Adding a book twice is a no-op.
    async fn add_library_book(&self, library_id: i64, book_id: i64) -> StoreResult<()>;
    async fn remove_library_book(&self, library_id: i64, book_id: i64) -> StoreResult<()>;
    /// Replaces the current librarian, if any.
    async fn assign_librarian(&self, library_id: i64, name: String) -> StoreResult<Librarian>;
    async fn librarian_for_library(&self, library_id: i64) -> StoreResult<Option<Librarian>>;
}

#[async_trait]
pub trait DashboardStore: Send + Sync {
    async fn stats(&self) -> StoreResult<Stats>;
}

pub trait Store:
    UserStore + SocialStore + NotificationStore + CatalogStore + LibraryStore + DashboardStore
{
}

impl<T> Store for T where
    T: UserStore + SocialStore + NotificationStore + CatalogStore + LibraryStore + DashboardStore
{
}
