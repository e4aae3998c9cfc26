use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{
    migrate::MigrateError, postgres::PgPoolOptions, PgConnection, PgPool, Postgres, QueryBuilder,
};
use time::OffsetDateTime;
use tracing::info;

use crate::{
    models::{
        account::{Follow, FollowCounts, NewUser, Role, User, UserChanges},
        catalog::{Author, Book, BookChanges, Librarian, Library, NewAuthor, NewBook, Stats},
        notification::{Notification, NotificationTarget},
        post::{Comment, Like, LikeSummary, NewComment, NewPost, Post, PostChanges},
    },
    utils::{
        filters::{
            like_pattern, AuthorFilter, AuthorOrder, BookFilter, BookOrder, CommentFilter,
            NotificationFilter, PostFilter, TimestampOrder, UserFilter, UserOrder,
        },
        ordering::{OrderBy, OrderField},
        pagination::{Page, PaginationParams},
    },
};

use super::{
    CatalogStore, DashboardStore, LibraryStore, NotificationStore, SocialStore, StoreError,
    StoreResult, UserStore,
};

const USER_COLUMNS: &str = "u.id, u.username, u.email, u.password, u.bio, u.role, u.token_key, u.created_at";
const POST_COLUMNS: &str = "id, author_id, title, content, created_at, updated_at";
const COMMENT_COLUMNS: &str = "id, post_id, author_id, content, created_at, updated_at";
const NOTIFICATION_COLUMNS: &str =
    "id, recipient_id, actor_id, verb, comment_id, like_id, follow_id, created_at, read";
const BOOK_COLUMNS: &str =
    "b.id, b.title, b.publication_year, b.author_id, b.created_at, b.updated_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    password: String,
    bio: String,
    role: String,
    token_key: String,
    created_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|e| StoreError::Integrity(format!("user {} : {e}", row.id)))?;
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            password: row.password,
            bio: row.bio,
            role,
            token_key: row.token_key,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: i64,
    recipient_id: i64,
    actor_id: i64,
    verb: String,
    comment_id: Option<i64>,
    like_id: Option<i64>,
    follow_id: Option<i64>,
    created_at: OffsetDateTime,
    read: bool,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let target =
            NotificationTarget::from_columns(&row.verb, row.comment_id, row.like_id, row.follow_id)
                .ok_or_else(|| {
                    StoreError::Integrity(format!(
                        "notification {} has a target that does not match verb `{}`",
                        row.id, row.verb
                    ))
                })?;
        Ok(Notification {
            id: row.id,
            recipient_id: row.recipient_id,
            actor_id: row.actor_id,
            target,
            created_at: row.created_at,
            read: row.read,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LikeSummaryRow {
    post_id: i64,
    count: i64,
    liked: bool,
}

fn users_from_rows(rows: Vec<UserRow>) -> StoreResult<Vec<User>> {
    rows.into_iter().map(User::try_from).collect()
}

fn notifications_from_rows(rows: Vec<NotificationRow>) -> StoreResult<Vec<Notification>> {
    rows.into_iter().map(Notification::try_from).collect()
}

/// Maps a unique violation to a client facing conflict.
fn on_unique(e: sqlx::Error, message: &str) -> StoreError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => StoreError::Conflict(message.to_string()),
        _ => StoreError::Database(e),
    }
}

fn on_missing_parent(e: sqlx::Error, missing: StoreError) -> StoreError {
    match e.as_database_error() {
        Some(db) if db.is_foreign_key_violation() => missing,
        _ => StoreError::Database(e),
    }
}

fn invalid_author(author_id: i64) -> StoreError {
    StoreError::Conflict(format!(
        "Invalid author {author_id} - object does not exist."
    ))
}

/// Every term has to hit one of `columns`.
fn push_search(query: &mut QueryBuilder<'_, Postgres>, terms: &[String], columns: &[&str]) {
    for term in terms {
        let pattern = like_pattern(term);
        query.push(" AND (");
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                query.push(" OR ");
            }
            query.push(*column).push(" ILIKE ").push_bind(pattern.clone());
        }
        query.push(")");
    }
}

fn push_window(query: &mut QueryBuilder<'_, Postgres>, page: PaginationParams) {
    query
        .push(" LIMIT ")
        .push_bind(i64::try_from(page.limit()).unwrap_or(i64::MAX))
        .push(" OFFSET ")
        .push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));
}

fn push_order<F: OrderField>(query: &mut QueryBuilder<'_, Postgres>, order: &OrderBy<F>, id: &str) {
    query.push(order.sql(id));
}

fn to_count(count: i64) -> u64 {
    u64::try_from(count).unwrap_or_default()
}

async fn insert_notification(
    conn: &mut PgConnection,
    recipient_id: i64,
    actor_id: i64,
    target: NotificationTarget,
) -> StoreResult<Notification> {
    let sql = format!(
        "INSERT INTO notifications (recipient_id, actor_id, verb, comment_id, like_id, follow_id) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING {NOTIFICATION_COLUMNS}"
    );
    let row = sqlx::query_as::<_, NotificationRow>(&sql)
        .bind(recipient_id)
        .bind(actor_id)
        .bind(target.verb())
        .bind(target.comment_id())
        .bind(target.like_id())
        .bind(target.follow_id())
        .fetch_one(conn)
        .await?;
    row.try_into()
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        info!("Connected to the database");
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, new_user: NewUser) -> StoreResult<User> {
        let sql = format!(
            "INSERT INTO users AS u (username, email, password, bio, role, token_key) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&new_user.username)
            .bind(&new_user.email)
            .bind(&new_user.password)
            .bind(&new_user.bio)
            .bind(new_user.role.as_str())
            .bind(&new_user.token_key)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                let on_email = e
                    .as_database_error()
                    .and_then(|db| db.constraint())
                    .is_some_and(|c| c.contains("email"));
                if on_email {
                    on_unique(e, "A user with that email already exists.")
                } else {
                    on_unique(e, "A user with that username already exists.")
                }
            })?;
        row.try_into()
    }

    async fn user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = $1");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.username = $1");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE lower(u.email) = lower($1)");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn user_by_token_key(&self, token_key: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.token_key = $1");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(token_key)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn users_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ANY($1)");
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        users_from_rows(rows)
    }

    async fn list_users(
        &self,
        filter: &UserFilter,
        order: &OrderBy<UserOrder>,
        page: PaginationParams,
    ) -> StoreResult<Page<User>> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users u WHERE TRUE");
        push_search(&mut count_query, &filter.search, &["u.username"]);
        let count: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut query =
            QueryBuilder::<Postgres>::new(format!("SELECT {USER_COLUMNS} FROM users u WHERE TRUE"));
        push_search(&mut query, &filter.search, &["u.username"]);
        push_order(&mut query, order, "u.id");
        push_window(&mut query, page);
        let rows = query
            .build_query_as::<UserRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page {
            count: to_count(count),
            items: users_from_rows(rows)?,
        })
    }

    async fn update_user(&self, id: i64, changes: UserChanges) -> StoreResult<User> {
        let sql = format!(
            "UPDATE users AS u SET \
                email = COALESCE($2, u.email), \
                bio = COALESCE($3, u.bio), \
                role = COALESCE($4, u.role), \
                token_key = COALESCE($5, u.token_key) \
             WHERE u.id = $1 RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(changes.email)
            .bind(changes.bio)
            .bind(changes.role.map(|r| r.as_str()))
            .bind(changes.token_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| on_unique(e, "A user with that email already exists."))?
            .ok_or(StoreError::NotFound)?;
        row.try_into()
    }

    async fn delete_user(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn create_follow(
        &self,
        follower_id: i64,
        followed_id: i64,
    ) -> StoreResult<(Follow, Notification)> {
        if follower_id == followed_id {
            return Err(StoreError::Conflict("You cannot follow yourself.".to_string()));
        }
        let mut tx = self.pool.begin().await?;
        let follow = sqlx::query_as::<_, Follow>(
            "INSERT INTO follows (follower_id, followed_id) VALUES ($1, $2) \
             ON CONFLICT (follower_id, followed_id) DO NOTHING \
             RETURNING id, follower_id, followed_id, created_at",
        )
        .bind(follower_id)
        .bind(followed_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| on_missing_parent(e, StoreError::NotFound))?
        .ok_or_else(|| StoreError::Conflict("You are already following this user.".to_string()))?;
        let notification = insert_notification(
            &mut tx,
            followed_id,
            follower_id,
            NotificationTarget::Follow(follow.id),
        )
        .await?;
        tx.commit().await?;
        Ok((follow, notification))
    }

    async fn delete_follow(&self, follower_id: i64, followed_id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND followed_id = $2")
            .bind(follower_id)
            .bind(followed_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn following_ids(&self, follower_id: i64) -> StoreResult<Vec<i64>> {
        Ok(
            sqlx::query_scalar::<_, i64>("SELECT followed_id FROM follows WHERE follower_id = $1")
                .bind(follower_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn follow_counts(&self, user_id: i64) -> StoreResult<FollowCounts> {
        let (followers, following) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT \
                (SELECT COUNT(*) FROM follows WHERE followed_id = $1), \
                (SELECT COUNT(*) FROM follows WHERE follower_id = $1)",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(FollowCounts {
            followers: to_count(followers),
            following: to_count(following),
        })
    }
}

fn push_post_filters(query: &mut QueryBuilder<'_, Postgres>, filter: &PostFilter) {
    if let Some(author) = filter.author {
        query.push(" AND author_id = ").push_bind(author);
    }
    if let Some(authors) = &filter.authors_in {
        query.push(" AND author_id = ANY(").push_bind(authors.clone()).push(")");
    }
    push_search(query, &filter.search, &["title", "content"]);
}

fn push_comment_filters(query: &mut QueryBuilder<'_, Postgres>, filter: &CommentFilter) {
    if let Some(post) = filter.post {
        query.push(" AND post_id = ").push_bind(post);
    }
    if let Some(author) = filter.author {
        query.push(" AND author_id = ").push_bind(author);
    }
    push_search(query, &filter.search, &["content"]);
}

#[async_trait]
impl SocialStore for PgStore {
    async fn create_post(&self, new_post: NewPost) -> StoreResult<Post> {
        let sql = format!(
            "INSERT INTO posts (author_id, title, content) VALUES ($1, $2, $3) RETURNING {POST_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Post>(&sql)
            .bind(new_post.author_id)
            .bind(new_post.title)
            .bind(new_post.content)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn post_by_id(&self, id: i64) -> StoreResult<Option<Post>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
        Ok(sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_posts(
        &self,
        filter: &PostFilter,
        order: &OrderBy<TimestampOrder>,
        page: PaginationParams,
    ) -> StoreResult<Page<Post>> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM posts WHERE TRUE");
        push_post_filters(&mut count_query, filter);
        let count: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut query =
            QueryBuilder::<Postgres>::new(format!("SELECT {POST_COLUMNS} FROM posts WHERE TRUE"));
        push_post_filters(&mut query, filter);
        push_order(&mut query, order, "id");
        push_window(&mut query, page);
        let items = query.build_query_as::<Post>().fetch_all(&self.pool).await?;

        Ok(Page {
            count: to_count(count),
            items,
        })
    }

    async fn update_post(&self, id: i64, changes: PostChanges) -> StoreResult<Post> {
        let sql = format!(
            "UPDATE posts SET title = COALESCE($2, title), content = COALESCE($3, content), \
             updated_at = now() WHERE id = $1 RETURNING {POST_COLUMNS}"
        );
        sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .bind(changes.title)
            .bind(changes.content)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn delete_post(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn create_comment(
        &self,
        new_comment: NewComment,
        notify: Option<i64>,
    ) -> StoreResult<(Comment, Option<Notification>)> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "INSERT INTO comments (post_id, author_id, content) VALUES ($1, $2, $3) \
             RETURNING {COMMENT_COLUMNS}"
        );
        let comment = sqlx::query_as::<_, Comment>(&sql)
            .bind(new_comment.post_id)
            .bind(new_comment.author_id)
            .bind(new_comment.content)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| on_missing_parent(e, StoreError::NotFound))?;
        let notification = match notify {
            Some(recipient) => Some(
                insert_notification(
                    &mut tx,
                    recipient,
                    comment.author_id,
                    NotificationTarget::Comment(comment.id),
                )
                .await?,
            ),
            None => None,
        };
        tx.commit().await?;
        Ok((comment, notification))
    }

    async fn comment_by_id(&self, id: i64) -> StoreResult<Option<Comment>> {
        let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1");
        Ok(sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_comments(
        &self,
        filter: &CommentFilter,
        order: &OrderBy<TimestampOrder>,
        page: PaginationParams,
    ) -> StoreResult<Page<Comment>> {
        let mut count_query =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM comments WHERE TRUE");
        push_comment_filters(&mut count_query, filter);
        let count: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE TRUE"
        ));
        push_comment_filters(&mut query, filter);
        push_order(&mut query, order, "id");
        push_window(&mut query, page);
        let items = query
            .build_query_as::<Comment>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page {
            count: to_count(count),
            items,
        })
    }

    async fn comments_for_posts(&self, post_ids: &[i64]) -> StoreResult<Vec<Comment>> {
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE post_id = ANY($1) \
             ORDER BY created_at DESC, id DESC"
        );
        Ok(sqlx::query_as::<_, Comment>(&sql)
            .bind(post_ids)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_comment(&self, id: i64, content: String) -> StoreResult<Comment> {
        let sql = format!(
            "UPDATE comments SET content = $2, updated_at = now() WHERE id = $1 \
             RETURNING {COMMENT_COLUMNS}"
        );
        sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .bind(content)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn delete_comment(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn create_like(
        &self,
        user_id: i64,
        post_id: i64,
        notify: Option<i64>,
    ) -> StoreResult<(Like, Option<Notification>)> {
        let mut tx = self.pool.begin().await?;
        // The unique (user_id, post_id) index decides the race; the loser
        // inserts nothing and sees a conflict.
        let like = sqlx::query_as::<_, Like>(
            "INSERT INTO likes (user_id, post_id) VALUES ($1, $2) \
             ON CONFLICT (user_id, post_id) DO NOTHING \
             RETURNING id, user_id, post_id, created_at",
        )
        .bind(user_id)
        .bind(post_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| on_missing_parent(e, StoreError::NotFound))?
        .ok_or_else(|| StoreError::Conflict("You have already liked this post.".to_string()))?;
        let notification = match notify {
            Some(recipient) => Some(
                insert_notification(&mut tx, recipient, user_id, NotificationTarget::Like(like.id))
                    .await?,
            ),
            None => None,
        };
        tx.commit().await?;
        Ok((like, notification))
    }

    async fn delete_like(&self, user_id: i64, post_id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM likes WHERE user_id = $1 AND post_id = $2")
            .bind(user_id)
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn likes_for_post(&self, post_id: i64, page: PaginationParams) -> StoreResult<Page<Like>> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM likes WHERE post_id = $1")
            .bind(post_id)
            .fetch_one(&self.pool)
            .await?;
        let mut query = QueryBuilder::<Postgres>::new(
            "SELECT id, user_id, post_id, created_at FROM likes WHERE post_id = ",
        );
        query
            .push_bind(post_id)
            .push(" ORDER BY created_at DESC, id DESC");
        push_window(&mut query, page);
        let items = query.build_query_as::<Like>().fetch_all(&self.pool).await?;
        Ok(Page {
            count: to_count(count),
            items,
        })
    }

    async fn like_summaries(
        &self,
        post_ids: &[i64],
        viewer_id: Option<i64>,
    ) -> StoreResult<HashMap<i64, LikeSummary>> {
        let rows = sqlx::query_as::<_, LikeSummaryRow>(
            "SELECT post_id, COUNT(*) AS count, COALESCE(BOOL_OR(user_id = $2), FALSE) AS liked \
             FROM likes WHERE post_id = ANY($1) GROUP BY post_id",
        )
        .bind(post_ids)
        .bind(viewer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.post_id,
                    LikeSummary {
                        count: to_count(row.count),
                        liked_by_viewer: row.liked,
                    },
                )
            })
            .collect())
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn list_notifications(
        &self,
        recipient_id: i64,
        filter: &NotificationFilter,
        page: PaginationParams,
    ) -> StoreResult<Page<Notification>> {
        let mut count_query = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = ",
        );
        count_query.push_bind(recipient_id);
        if let Some(read) = filter.read {
            count_query.push(" AND read = ").push_bind(read);
        }
        let count: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE recipient_id = "
        ));
        query.push_bind(recipient_id);
        if let Some(read) = filter.read {
            query.push(" AND read = ").push_bind(read);
        }
        query.push(" ORDER BY created_at DESC, id DESC");
        push_window(&mut query, page);
        let rows = query
            .build_query_as::<NotificationRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page {
            count: to_count(count),
            items: notifications_from_rows(rows)?,
        })
    }

    async fn notification_by_id(&self, id: i64) -> StoreResult<Option<Notification>> {
        let sql = format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1");
        sqlx::query_as::<_, NotificationRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Notification::try_from)
            .transpose()
    }

    async fn mark_read(&self, id: i64) -> StoreResult<Notification> {
        let sql = format!(
            "UPDATE notifications SET read = TRUE WHERE id = $1 RETURNING {NOTIFICATION_COLUMNS}"
        );
        sqlx::query_as::<_, NotificationRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?
            .try_into()
    }

    async fn mark_all_read(&self, recipient_id: i64) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET read = TRUE WHERE recipient_id = $1 AND NOT read",
        )
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn unread_count(&self, recipient_id: i64) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND NOT read",
        )
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(to_count(count))
    }
}

fn push_book_filters(query: &mut QueryBuilder<'_, Postgres>, filter: &BookFilter) {
    if let Some(author) = filter.author {
        query.push(" AND b.author_id = ").push_bind(author);
    }
    if let Some(year) = filter.publication_year {
        query.push(" AND b.publication_year = ").push_bind(year);
    }
    if let Some(year) = filter.publication_year_gt {
        query.push(" AND b.publication_year > ").push_bind(year);
    }
    if let Some(year) = filter.publication_year_lt {
        query.push(" AND b.publication_year < ").push_bind(year);
    }
    if let Some(title) = &filter.title {
        query.push(" AND b.title ILIKE ").push_bind(like_pattern(title));
    }
    if let Some(name) = &filter.author_name {
        query.push(" AND a.name ILIKE ").push_bind(like_pattern(name));
    }
    if let Some(date) = filter.created_after {
        query
            .push(" AND (b.created_at AT TIME ZONE 'UTC')::date >= ")
            .push_bind(date);
    }
    if let Some(date) = filter.created_before {
        query
            .push(" AND (b.created_at AT TIME ZONE 'UTC')::date <= ")
            .push_bind(date);
    }
    push_search(query, &filter.search, &["b.title", "a.name"]);
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn create_author(&self, new_author: NewAuthor) -> StoreResult<Author> {
        Ok(sqlx::query_as::<_, Author>(
            "INSERT INTO authors (name) VALUES ($1) RETURNING id, name, created_at, updated_at",
        )
        .bind(new_author.name)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn author_by_id(&self, id: i64) -> StoreResult<Option<Author>> {
        Ok(sqlx::query_as::<_, Author>(
            "SELECT id, name, created_at, updated_at FROM authors WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn existing_author_ids(&self, ids: &[i64]) -> StoreResult<Vec<i64>> {
        Ok(
            sqlx::query_scalar::<_, i64>("SELECT id FROM authors WHERE id = ANY($1)")
                .bind(ids)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn list_authors(
        &self,
        filter: &AuthorFilter,
        order: &OrderBy<AuthorOrder>,
        page: PaginationParams,
    ) -> StoreResult<Page<Author>> {
        let mut count_query =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM authors a WHERE TRUE");
        push_search(&mut count_query, &filter.search, &["a.name"]);
        let count: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut query = QueryBuilder::<Postgres>::new(
            "SELECT a.id, a.name, a.created_at, a.updated_at FROM authors a WHERE TRUE",
        );
        push_search(&mut query, &filter.search, &["a.name"]);
        push_order(&mut query, order, "a.id");
        push_window(&mut query, page);
        let items = query
            .build_query_as::<Author>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page {
            count: to_count(count),
            items,
        })
    }

    async fn update_author(&self, id: i64, name: String) -> StoreResult<Author> {
        sqlx::query_as::<_, Author>(
            "UPDATE authors SET name = $2, updated_at = now() WHERE id = $1 \
             RETURNING id, name, created_at, updated_at",
        )
        .bind(id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn delete_author(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM authors WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn create_books(&self, new_books: Vec<NewBook>) -> StoreResult<Vec<Book>> {
        let sql = format!(
            "INSERT INTO books AS b (title, publication_year, author_id) VALUES ($1, $2, $3) \
             RETURNING {BOOK_COLUMNS}"
        );
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(new_books.len());
        for new_book in new_books {
            let author_id = new_book.author_id;
            let book = sqlx::query_as::<_, Book>(&sql)
                .bind(new_book.title)
                .bind(new_book.publication_year)
                .bind(author_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| on_missing_parent(e, invalid_author(author_id)))?;
            created.push(book);
        }
        tx.commit().await?;
        Ok(created)
    }

    async fn book_by_id(&self, id: i64) -> StoreResult<Option<Book>> {
        let sql = format!("SELECT {BOOK_COLUMNS} FROM books b WHERE b.id = $1");
        Ok(sqlx::query_as::<_, Book>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_books(
        &self,
        filter: &BookFilter,
        order: &OrderBy<BookOrder>,
        page: PaginationParams,
    ) -> StoreResult<Page<Book>> {
        let mut count_query = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM books b JOIN authors a ON a.id = b.author_id WHERE TRUE",
        );
        push_book_filters(&mut count_query, filter);
        let count: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {BOOK_COLUMNS} FROM books b JOIN authors a ON a.id = b.author_id WHERE TRUE"
        ));
        push_book_filters(&mut query, filter);
        push_order(&mut query, order, "b.id");
        push_window(&mut query, page);
        let items = query.build_query_as::<Book>().fetch_all(&self.pool).await?;

        Ok(Page {
            count: to_count(count),
            items,
        })
    }

    async fn books_for_authors(&self, author_ids: &[i64]) -> StoreResult<Vec<Book>> {
        let sql = format!(
            "SELECT {BOOK_COLUMNS} FROM books b WHERE b.author_id = ANY($1) ORDER BY b.title, b.id"
        );
        Ok(sqlx::query_as::<_, Book>(&sql)
            .bind(author_ids)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_book(&self, id: i64, changes: BookChanges) -> StoreResult<Book> {
        let sql = format!(
            "UPDATE books AS b SET \
                title = COALESCE($2, b.title), \
                publication_year = COALESCE($3, b.publication_year), \
                author_id = COALESCE($4, b.author_id), \
                updated_at = now() \
             WHERE b.id = $1 RETURNING {BOOK_COLUMNS}"
        );
        let author_id = changes.author_id;
        sqlx::query_as::<_, Book>(&sql)
            .bind(id)
            .bind(changes.title)
            .bind(changes.publication_year)
            .bind(author_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| on_missing_parent(e, invalid_author(author_id.unwrap_or_default())))?
            .ok_or(StoreError::NotFound)
    }

    async fn delete_book(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_books(&self, ids: &[i64]) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM books WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl LibraryStore for PgStore {
    async fn create_library(&self, name: String) -> StoreResult<Library> {
        sqlx::query_as::<_, Library>(
            "INSERT INTO libraries (name) VALUES ($1) RETURNING id, name, created_at",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| on_unique(e, "A library with that name already exists."))
    }

    async fn library_by_id(&self, id: i64) -> StoreResult<Option<Library>> {
        Ok(
            sqlx::query_as::<_, Library>("SELECT id, name, created_at FROM libraries WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn list_libraries(&self, page: PaginationParams) -> StoreResult<Page<Library>> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM libraries")
            .fetch_one(&self.pool)
            .await?;
        let mut query = QueryBuilder::<Postgres>::new(
            "SELECT id, name, created_at FROM libraries ORDER BY name, id",
        );
        push_window(&mut query, page);
        let items = query
            .build_query_as::<Library>()
            .fetch_all(&self.pool)
            .await?;
        Ok(Page {
            count: to_count(count),
            items,
        })
    }

    async fn library_books(&self, library_id: i64) -> StoreResult<Vec<Book>> {
        let sql = format!(
            "SELECT {BOOK_COLUMNS} FROM books b \
             JOIN library_books lb ON lb.book_id = b.id \
             WHERE lb.library_id = $1 ORDER BY b.title, b.id"
        );
        Ok(sqlx::query_as::<_, Book>(&sql)
            .bind(library_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn add_library_book(&self, library_id: i64, book_id: i64) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO library_books (library_id, book_id) VALUES ($1, $2) \
             ON CONFLICT (library_id, book_id) DO NOTHING",
        )
        .bind(library_id)
        .bind(book_id)
        .execute(&self.pool)
        .await
        .map_err(|e| on_missing_parent(e, StoreError::NotFound))?;
        Ok(())
    }

    async fn remove_library_book(&self, library_id: i64, book_id: i64) -> StoreResult<()> {
        let result =
            sqlx::query("DELETE FROM library_books WHERE library_id = $1 AND book_id = $2")
                .bind(library_id)
                .bind(book_id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn assign_librarian(&self, library_id: i64, name: String) -> StoreResult<Librarian> {
        sqlx::query_as::<_, Librarian>(
            "INSERT INTO librarians (name, library_id) VALUES ($1, $2) \
             ON CONFLICT (library_id) DO UPDATE SET name = EXCLUDED.name \
             RETURNING id, name, library_id",
        )
        .bind(name)
        .bind(library_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| on_missing_parent(e, StoreError::NotFound))
    }

    async fn librarian_for_library(&self, library_id: i64) -> StoreResult<Option<Librarian>> {
        Ok(sqlx::query_as::<_, Librarian>(
            "SELECT id, name, library_id FROM librarians WHERE library_id = $1",
        )
        .bind(library_id)
        .fetch_optional(&self.pool)
        .await?)
    }
}

#[async_trait]
impl DashboardStore for PgStore {
    async fn stats(&self) -> StoreResult<Stats> {
        let (users, posts, comments, authors, books, libraries) =
            sqlx::query_as::<_, (i64, i64, i64, i64, i64, i64)>(
                "SELECT \
                    (SELECT COUNT(*) FROM users), \
                    (SELECT COUNT(*) FROM posts), \
                    (SELECT COUNT(*) FROM comments), \
                    (SELECT COUNT(*) FROM authors), \
                    (SELECT COUNT(*) FROM books), \
                    (SELECT COUNT(*) FROM libraries)",
            )
            .fetch_one(&self.pool)
            .await?;
        Ok(Stats {
            users: to_count(users),
            posts: to_count(posts),
            comments: to_count(comments),
            authors: to_count(authors),
            books: to_count(books),
            libraries: to_count(libraries),
        })
    }
}
