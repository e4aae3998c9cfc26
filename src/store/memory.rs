use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::{
    models::{
        account::{Follow, FollowCounts, NewUser, User, UserChanges},
        catalog::{Author, Book, BookChanges, Librarian, Library, NewAuthor, NewBook, Stats},
        notification::{Notification, NotificationTarget},
        post::{Comment, Like, LikeSummary, NewComment, NewPost, Post, PostChanges},
    },
    utils::{
        filters::{
            contains_ci, matches_search, AuthorFilter, AuthorOrder, BookFilter, BookOrder,
            CommentFilter, NotificationFilter, PostFilter, TimestampOrder, UserFilter, UserOrder,
        },
        ordering::OrderBy,
        pagination::{Page, PaginationParams},
    },
};

use super::{
    CatalogStore, DashboardStore, LibraryStore, NotificationStore, SocialStore, StoreError,
    StoreResult, UserStore,
};

#[derive(Default)]
struct Sequence(i64);

impl Sequence {
    fn next(&mut self) -> i64 {
        self.0 += 1;
        self.0
    }
}

#[derive(Default)]
struct Sequences {
    users: Sequence,
    follows: Sequence,
    posts: Sequence,
    comments: Sequence,
    likes: Sequence,
    notifications: Sequence,
    authors: Sequence,
    books: Sequence,
    libraries: Sequence,
    librarians: Sequence,
}

#[derive(Default)]
struct Tables {
    seq: Sequences,
    users: BTreeMap<i64, User>,
    follows: BTreeMap<i64, Follow>,
    posts: BTreeMap<i64, Post>,
    comments: BTreeMap<i64, Comment>,
    likes: BTreeMap<i64, Like>,
    notifications: BTreeMap<i64, Notification>,
    authors: BTreeMap<i64, Author>,
    books: BTreeMap<i64, Book>,
    libraries: BTreeMap<i64, Library>,
    librarians: BTreeMap<i64, Librarian>,
    /// (library_id, book_id)
    library_books: BTreeSet<(i64, i64)>,
}

impl Tables {
    fn push_notification(
        &mut self,
        recipient_id: i64,
        actor_id: i64,
        target: NotificationTarget,
    ) -> Notification {
        let notification = Notification {
            id: self.seq.notifications.next(),
            recipient_id,
            actor_id,
            target,
            created_at: OffsetDateTime::now_utc(),
            read: false,
        };
        self.notifications
            .insert(notification.id, notification.clone());
        notification
    }

    fn remove_comments(&mut self, ids: &[i64]) {
        for id in ids {
            self.comments.remove(id);
        }
        self.notifications
            .retain(|_, n| !n.target.comment_id().is_some_and(|id| ids.contains(&id)));
    }

    fn remove_likes(&mut self, ids: &[i64]) {
        for id in ids {
            self.likes.remove(id);
        }
        self.notifications
            .retain(|_, n| !n.target.like_id().is_some_and(|id| ids.contains(&id)));
    }

    fn remove_follows(&mut self, ids: &[i64]) {
        for id in ids {
            self.follows.remove(id);
        }
        self.notifications
            .retain(|_, n| !n.target.follow_id().is_some_and(|id| ids.contains(&id)));
    }

    fn remove_post(&mut self, post_id: i64) {
        let comments: Vec<i64> = self
            .comments
            .values()
            .filter(|c| c.post_id == post_id)
            .map(|c| c.id)
            .collect();
        self.remove_comments(&comments);
        let likes: Vec<i64> = self
            .likes
            .values()
            .filter(|l| l.post_id == post_id)
            .map(|l| l.id)
            .collect();
        self.remove_likes(&likes);
        self.posts.remove(&post_id);
    }

    fn remove_book(&mut self, book_id: i64) {
        self.library_books.retain(|(_, id)| *id != book_id);
        self.books.remove(&book_id);
    }

    fn username_or_email_taken(&self, username: &str, email: &str, except: Option<i64>) -> StoreResult<()> {
        for user in self.users.values().filter(|u| Some(u.id) != except) {
            if user.username == username {
                return Err(StoreError::Conflict(
                    "A user with that username already exists.".to_string(),
                ));
            }
            if user.email.eq_ignore_ascii_case(email) {
                return Err(StoreError::Conflict(
                    "A user with that email already exists.".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn paginate<T: Clone>(rows: Vec<T>, page: PaginationParams) -> Page<T> {
    Page {
        count: rows.len() as u64,
        items: page.window(&rows),
    }
}

fn timestamps(field: TimestampOrder, created_at: OffsetDateTime, updated_at: OffsetDateTime) -> OffsetDateTime {
    match field {
        TimestampOrder::CreatedAt => created_at,
        TimestampOrder::UpdatedAt => updated_at,
    }
}

/// Every table behind one lock, so each method is a serializable transaction.
#[derive(Default, Clone)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, new_user: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        tables.username_or_email_taken(&new_user.username, &new_user.email, None)?;
        let user = User {
            id: tables.seq.users.next(),
            username: new_user.username,
            email: new_user.email,
            password: new_user.password,
            bio: new_user.bio,
            role: new_user.role,
            token_key: new_user.token_key,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn user_by_token_key(&self, token_key: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.token_key == token_key)
            .cloned())
    }

    async fn users_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(ids.iter().filter_map(|id| tables.users.get(id).cloned()).collect())
    }

    async fn list_users(
        &self,
        filter: &UserFilter,
        order: &OrderBy<UserOrder>,
        page: PaginationParams,
    ) -> StoreResult<Page<User>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<User> = tables
            .users
            .values()
            .filter(|u| matches_search(&filter.search, &[&u.username]))
            .cloned()
            .collect();
        order.sort(
            &mut rows,
            |field, a, b| match field {
                UserOrder::Username => a.username.cmp(&b.username),
                UserOrder::CreatedAt => a.created_at.cmp(&b.created_at),
            },
            |u| u.id,
        );
        Ok(paginate(rows, page))
    }

    async fn update_user(&self, id: i64, changes: UserChanges) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        let Some(current) = tables.users.get(&id).cloned() else {
            return Err(StoreError::NotFound);
        };
        if let Some(email) = &changes.email {
            tables.username_or_email_taken(&current.username, email, Some(id))?;
        }
        let user = tables.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(bio) = changes.bio {
            user.bio = bio;
        }
        if let Some(role) = changes.role {
            user.role = role;
        }
        if let Some(token_key) = changes.token_key {
            user.token_key = token_key;
        }
        Ok(user.clone())
    }

    async fn delete_user(&self, id: i64) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        let posts: Vec<i64> = tables
            .posts
            .values()
            .filter(|p| p.author_id == id)
            .map(|p| p.id)
            .collect();
        for post_id in posts {
            tables.remove_post(post_id);
        }
        let comments: Vec<i64> = tables
            .comments
            .values()
            .filter(|c| c.author_id == id)
            .map(|c| c.id)
            .collect();
        tables.remove_comments(&comments);
        let likes: Vec<i64> = tables
            .likes
            .values()
            .filter(|l| l.user_id == id)
            .map(|l| l.id)
            .collect();
        tables.remove_likes(&likes);
        let follows: Vec<i64> = tables
            .follows
            .values()
            .filter(|f| f.follower_id == id || f.followed_id == id)
            .map(|f| f.id)
            .collect();
        tables.remove_follows(&follows);
        tables
            .notifications
            .retain(|_, n| n.recipient_id != id && n.actor_id != id);
        tables.users.remove(&id);
        Ok(())
    }

    async fn create_follow(
        &self,
        follower_id: i64,
        followed_id: i64,
    ) -> StoreResult<(Follow, Notification)> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&followed_id) {
            return Err(StoreError::NotFound);
        }
        if follower_id == followed_id {
            return Err(StoreError::Conflict("You cannot follow yourself.".to_string()));
        }
        if tables
            .follows
            .values()
            .any(|f| f.follower_id == follower_id && f.followed_id == followed_id)
        {
            return Err(StoreError::Conflict(
                "You are already following this user.".to_string(),
            ));
        }
        let follow = Follow {
            id: tables.seq.follows.next(),
            follower_id,
            followed_id,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.follows.insert(follow.id, follow.clone());
        let notification =
            tables.push_notification(followed_id, follower_id, NotificationTarget::Follow(follow.id));
        Ok((follow, notification))
    }

    async fn delete_follow(&self, follower_id: i64, followed_id: i64) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let ids: Vec<i64> = tables
            .follows
            .values()
            .filter(|f| f.follower_id == follower_id && f.followed_id == followed_id)
            .map(|f| f.id)
            .collect();
        if ids.is_empty() {
            return Err(StoreError::NotFound);
        }
        tables.remove_follows(&ids);
        Ok(())
    }

    async fn following_ids(&self, follower_id: i64) -> StoreResult<Vec<i64>> {
        let tables = self.tables.read().await;
        Ok(tables
            .follows
            .values()
            .filter(|f| f.follower_id == follower_id)
            .map(|f| f.followed_id)
            .collect())
    }

    async fn follow_counts(&self, user_id: i64) -> StoreResult<FollowCounts> {
        let tables = self.tables.read().await;
        let mut counts = FollowCounts::default();
        for follow in tables.follows.values() {
            if follow.followed_id == user_id {
                counts.followers += 1;
            }
            if follow.follower_id == user_id {
                counts.following += 1;
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl SocialStore for MemoryStore {
    async fn create_post(&self, new_post: NewPost) -> StoreResult<Post> {
        let mut tables = self.tables.write().await;
        let now = OffsetDateTime::now_utc();
        let post = Post {
            id: tables.seq.posts.next(),
            author_id: new_post.author_id,
            title: new_post.title,
            content: new_post.content,
            created_at: now,
            updated_at: now,
        };
        tables.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn post_by_id(&self, id: i64) -> StoreResult<Option<Post>> {
        Ok(self.tables.read().await.posts.get(&id).cloned())
    }

    async fn list_posts(
        &self,
        filter: &PostFilter,
        order: &OrderBy<TimestampOrder>,
        page: PaginationParams,
    ) -> StoreResult<Page<Post>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Post> = tables
            .posts
            .values()
            .filter(|p| filter.author.map_or(true, |id| p.author_id == id))
            .filter(|p| {
                filter
                    .authors_in
                    .as_ref()
                    .map_or(true, |ids| ids.contains(&p.author_id))
            })
            .filter(|p| matches_search(&filter.search, &[&p.title, &p.content]))
            .cloned()
            .collect();
        order.sort(
            &mut rows,
            |field, a, b| {
                timestamps(field, a.created_at, a.updated_at)
                    .cmp(&timestamps(field, b.created_at, b.updated_at))
            },
            |p| p.id,
        );
        Ok(paginate(rows, page))
    }

    async fn update_post(&self, id: i64, changes: PostChanges) -> StoreResult<Post> {
        let mut tables = self.tables.write().await;
        let post = tables.posts.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(title) = changes.title {
            post.title = title;
        }
        if let Some(content) = changes.content {
            post.content = content;
        }
        post.updated_at = OffsetDateTime::now_utc();
        Ok(post.clone())
    }

    async fn delete_post(&self, id: i64) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.posts.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        tables.remove_post(id);
        Ok(())
    }

    async fn create_comment(
        &self,
        new_comment: NewComment,
        notify: Option<i64>,
    ) -> StoreResult<(Comment, Option<Notification>)> {
        let mut tables = self.tables.write().await;
        if !tables.posts.contains_key(&new_comment.post_id) {
            return Err(StoreError::NotFound);
        }
        let now = OffsetDateTime::now_utc();
        let comment = Comment {
            id: tables.seq.comments.next(),
            post_id: new_comment.post_id,
            author_id: new_comment.author_id,
            content: new_comment.content,
            created_at: now,
            updated_at: now,
        };
        tables.comments.insert(comment.id, comment.clone());
        let notification = notify.map(|recipient| {
            tables.push_notification(
                recipient,
                comment.author_id,
                NotificationTarget::Comment(comment.id),
            )
        });
        Ok((comment, notification))
    }

    async fn comment_by_id(&self, id: i64) -> StoreResult<Option<Comment>> {
        Ok(self.tables.read().await.comments.get(&id).cloned())
    }

    async fn list_comments(
        &self,
        filter: &CommentFilter,
        order: &OrderBy<TimestampOrder>,
        page: PaginationParams,
    ) -> StoreResult<Page<Comment>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Comment> = tables
            .comments
            .values()
            .filter(|c| filter.post.map_or(true, |id| c.post_id == id))
            .filter(|c| filter.author.map_or(true, |id| c.author_id == id))
            .filter(|c| matches_search(&filter.search, &[&c.content]))
            .cloned()
            .collect();
        order.sort(
            &mut rows,
            |field, a, b| {
                timestamps(field, a.created_at, a.updated_at)
                    .cmp(&timestamps(field, b.created_at, b.updated_at))
            },
            |c| c.id,
        );
        Ok(paginate(rows, page))
    }

    async fn comments_for_posts(&self, post_ids: &[i64]) -> StoreResult<Vec<Comment>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Comment> = tables
            .comments
            .values()
            .filter(|c| post_ids.contains(&c.post_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn update_comment(&self, id: i64, content: String) -> StoreResult<Comment> {
        let mut tables = self.tables.write().await;
        let comment = tables.comments.get_mut(&id).ok_or(StoreError::NotFound)?;
        comment.content = content;
        comment.updated_at = OffsetDateTime::now_utc();
        Ok(comment.clone())
    }

    async fn delete_comment(&self, id: i64) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.comments.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        tables.remove_comments(&[id]);
        Ok(())
    }

    async fn create_like(
        &self,
        user_id: i64,
        post_id: i64,
        notify: Option<i64>,
    ) -> StoreResult<(Like, Option<Notification>)> {
        let mut tables = self.tables.write().await;
        if !tables.posts.contains_key(&post_id) {
            return Err(StoreError::NotFound);
        }
        if tables
            .likes
            .values()
            .any(|l| l.user_id == user_id && l.post_id == post_id)
        {
            return Err(StoreError::Conflict(
                "You have already liked this post.".to_string(),
            ));
        }
        let like = Like {
            id: tables.seq.likes.next(),
            user_id,
            post_id,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.likes.insert(like.id, like.clone());
        let notification = notify
            .map(|recipient| tables.push_notification(recipient, user_id, NotificationTarget::Like(like.id)));
        Ok((like, notification))
    }

    async fn delete_like(&self, user_id: i64, post_id: i64) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let ids: Vec<i64> = tables
            .likes
            .values()
            .filter(|l| l.user_id == user_id && l.post_id == post_id)
            .map(|l| l.id)
            .collect();
        if ids.is_empty() {
            return Err(StoreError::NotFound);
        }
        tables.remove_likes(&ids);
        Ok(())
    }

    async fn likes_for_post(&self, post_id: i64, page: PaginationParams) -> StoreResult<Page<Like>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Like> = tables
            .likes
            .values()
            .filter(|l| l.post_id == post_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(rows, page))
    }

    async fn like_summaries(
        &self,
        post_ids: &[i64],
        viewer_id: Option<i64>,
    ) -> StoreResult<HashMap<i64, LikeSummary>> {
        let tables = self.tables.read().await;
        let mut summaries: HashMap<i64, LikeSummary> = HashMap::new();
        for like in tables.likes.values().filter(|l| post_ids.contains(&l.post_id)) {
            let summary = summaries.entry(like.post_id).or_default();
            summary.count += 1;
            if Some(like.user_id) == viewer_id {
                summary.liked_by_viewer = true;
            }
        }
        Ok(summaries)
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn list_notifications(
        &self,
        recipient_id: i64,
        filter: &NotificationFilter,
        page: PaginationParams,
    ) -> StoreResult<Page<Notification>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Notification> = tables
            .notifications
            .values()
            .filter(|n| n.recipient_id == recipient_id)
            .filter(|n| filter.read.map_or(true, |read| n.read == read))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(rows, page))
    }

    async fn notification_by_id(&self, id: i64) -> StoreResult<Option<Notification>> {
        Ok(self.tables.read().await.notifications.get(&id).cloned())
    }

    async fn mark_read(&self, id: i64) -> StoreResult<Notification> {
        let mut tables = self.tables.write().await;
        let notification = tables
            .notifications
            .get_mut(&id)
            .ok_or(StoreError::NotFound)?;
        notification.read = true;
        Ok(notification.clone())
    }

    async fn mark_all_read(&self, recipient_id: i64) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let mut flipped = 0;
        for notification in tables
            .notifications
            .values_mut()
            .filter(|n| n.recipient_id == recipient_id && !n.read)
        {
            notification.read = true;
            flipped += 1;
        }
        Ok(flipped)
    }

    async fn unread_count(&self, recipient_id: i64) -> StoreResult<u64> {
        let tables = self.tables.read().await;
        Ok(tables
            .notifications
            .values()
            .filter(|n| n.recipient_id == recipient_id && !n.read)
            .count() as u64)
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn create_author(&self, new_author: NewAuthor) -> StoreResult<Author> {
        let mut tables = self.tables.write().await;
        let now = OffsetDateTime::now_utc();
        let author = Author {
            id: tables.seq.authors.next(),
            name: new_author.name,
            created_at: now,
            updated_at: now,
        };
        tables.authors.insert(author.id, author.clone());
        Ok(author)
    }

    async fn author_by_id(&self, id: i64) -> StoreResult<Option<Author>> {
        Ok(self.tables.read().await.authors.get(&id).cloned())
    }

    async fn existing_author_ids(&self, ids: &[i64]) -> StoreResult<Vec<i64>> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .copied()
            .filter(|id| tables.authors.contains_key(id))
            .collect())
    }

    async fn list_authors(
        &self,
        filter: &AuthorFilter,
        order: &OrderBy<AuthorOrder>,
        page: PaginationParams,
    ) -> StoreResult<Page<Author>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Author> = tables
            .authors
            .values()
            .filter(|a| matches_search(&filter.search, &[&a.name]))
            .cloned()
            .collect();
        order.sort(
            &mut rows,
            |field, a, b| match field {
                AuthorOrder::Name => a.name.cmp(&b.name),
                AuthorOrder::CreatedAt => a.created_at.cmp(&b.created_at),
            },
            |a| a.id,
        );
        Ok(paginate(rows, page))
    }

    async fn update_author(&self, id: i64, name: String) -> StoreResult<Author> {
        let mut tables = self.tables.write().await;
        let author = tables.authors.get_mut(&id).ok_or(StoreError::NotFound)?;
        author.name = name;
        author.updated_at = OffsetDateTime::now_utc();
        Ok(author.clone())
    }

    async fn delete_author(&self, id: i64) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.authors.remove(&id).is_none() {
            return Err(StoreError::NotFound);
        }
        let books: Vec<i64> = tables
            .books
            .values()
            .filter(|b| b.author_id == id)
            .map(|b| b.id)
            .collect();
        for book_id in books {
            tables.remove_book(book_id);
        }
        Ok(())
    }

    async fn create_books(&self, new_books: Vec<NewBook>) -> StoreResult<Vec<Book>> {
        let mut tables = self.tables.write().await;
        if let Some(missing) = new_books
            .iter()
            .find(|b| !tables.authors.contains_key(&b.author_id))
        {
            return Err(StoreError::Conflict(format!(
                "Invalid author {} - object does not exist.",
                missing.author_id
            )));
        }
        let now = OffsetDateTime::now_utc();
        let mut created = Vec::with_capacity(new_books.len());
        for new_book in new_books {
            let book = Book {
                id: tables.seq.books.next(),
                title: new_book.title,
                publication_year: new_book.publication_year,
                author_id: new_book.author_id,
                created_at: now,
                updated_at: now,
            };
            tables.books.insert(book.id, book.clone());
            created.push(book);
        }
        Ok(created)
    }

    async fn book_by_id(&self, id: i64) -> StoreResult<Option<Book>> {
        Ok(self.tables.read().await.books.get(&id).cloned())
    }

    async fn list_books(
        &self,
        filter: &BookFilter,
        order: &OrderBy<BookOrder>,
        page: PaginationParams,
    ) -> StoreResult<Page<Book>> {
        let tables = self.tables.read().await;
        let author_name = |book: &Book| {
            tables
                .authors
                .get(&book.author_id)
                .map(|a| a.name.as_str())
                .unwrap_or_default()
        };
        let mut rows: Vec<Book> = tables
            .books
            .values()
            .filter(|b| {
                filter.matches_book(&b.title, b.publication_year, b.author_id, b.created_at)
            })
            .filter(|b| {
                filter
                    .author_name
                    .as_deref()
                    .map_or(true, |name| contains_ci(author_name(b), name))
            })
            .filter(|b| matches_search(&filter.search, &[&b.title, author_name(b)]))
            .cloned()
            .collect();
        order.sort(
            &mut rows,
            |field, a, b| match field {
                BookOrder::Title => a.title.cmp(&b.title),
                BookOrder::PublicationYear => a.publication_year.cmp(&b.publication_year),
                BookOrder::CreatedAt => a.created_at.cmp(&b.created_at),
            },
            |b| b.id,
        );
        Ok(paginate(rows, page))
    }

    async fn books_for_authors(&self, author_ids: &[i64]) -> StoreResult<Vec<Book>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Book> = tables
            .books
            .values()
            .filter(|b| author_ids.contains(&b.author_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn update_book(&self, id: i64, changes: BookChanges) -> StoreResult<Book> {
        let mut tables = self.tables.write().await;
        if let Some(author_id) = changes.author_id {
            if !tables.authors.contains_key(&author_id) {
                return Err(StoreError::Conflict(format!(
                    "Invalid author {author_id} - object does not exist."
                )));
            }
        }
        let book = tables.books.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(title) = changes.title {
            book.title = title;
        }
        if let Some(year) = changes.publication_year {
            book.publication_year = year;
        }
        if let Some(author_id) = changes.author_id {
            book.author_id = author_id;
        }
        book.updated_at = OffsetDateTime::now_utc();
        Ok(book.clone())
    }

    async fn delete_book(&self, id: i64) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.books.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        tables.remove_book(id);
        Ok(())
    }

    async fn delete_books(&self, ids: &[i64]) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let existing: BTreeSet<i64> = ids
            .iter()
            .copied()
            .filter(|id| tables.books.contains_key(id))
            .collect();
        for id in &existing {
            tables.remove_book(*id);
        }
        Ok(existing.len() as u64)
    }
}

#[async_trait]
impl LibraryStore for MemoryStore {
    async fn create_library(&self, name: String) -> StoreResult<Library> {
        let mut tables = self.tables.write().await;
        if tables.libraries.values().any(|l| l.name == name) {
            return Err(StoreError::Conflict(
                "A library with that name already exists.".to_string(),
            ));
        }
        let library = Library {
            id: tables.seq.libraries.next(),
            name,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.libraries.insert(library.id, library.clone());
        Ok(library)
    }

    async fn library_by_id(&self, id: i64) -> StoreResult<Option<Library>> {
        Ok(self.tables.read().await.libraries.get(&id).cloned())
    }

    async fn list_libraries(&self, page: PaginationParams) -> StoreResult<Page<Library>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Library> = tables.libraries.values().cloned().collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(paginate(rows, page))
    }

    async fn library_books(&self, library_id: i64) -> StoreResult<Vec<Book>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Book> = tables
            .library_books
            .iter()
            .filter(|(library, _)| *library == library_id)
            .filter_map(|(_, book)| tables.books.get(book).cloned())
            .collect();
        rows.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn add_library_book(&self, library_id: i64, book_id: i64) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.libraries.contains_key(&library_id) || !tables.books.contains_key(&book_id) {
            return Err(StoreError::NotFound);
        }
        tables.library_books.insert((library_id, book_id));
        Ok(())
    }

    async fn remove_library_book(&self, library_id: i64, book_id: i64) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.library_books.remove(&(library_id, book_id)) {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn assign_librarian(&self, library_id: i64, name: String) -> StoreResult<Librarian> {
        let mut tables = self.tables.write().await;
        if !tables.libraries.contains_key(&library_id) {
            return Err(StoreError::NotFound);
        }
        tables.librarians.retain(|_, l| l.library_id != library_id);
        let librarian = Librarian {
            id: tables.seq.librarians.next(),
            name,
            library_id,
        };
        tables.librarians.insert(librarian.id, librarian.clone());
        Ok(librarian)
    }

    async fn librarian_for_library(&self, library_id: i64) -> StoreResult<Option<Librarian>> {
        let tables = self.tables.read().await;
        Ok(tables
            .librarians
            .values()
            .find(|l| l.library_id == library_id)
            .cloned())
    }
}

#[async_trait]
impl DashboardStore for MemoryStore {
    async fn stats(&self) -> StoreResult<Stats> {
        let tables = self.tables.read().await;
        Ok(Stats {
            users: tables.users.len() as u64,
            posts: tables.posts.len() as u64,
            comments: tables.comments.len() as u64,
            authors: tables.authors.len() as u64,
            books: tables.books.len() as u64,
            libraries: tables.libraries.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::account::Role;

    async fn user(store: &MemoryStore, username: &str) -> User {
        store
            .create_user(NewUser {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                password: "x".to_string(),
                bio: String::new(),
                role: Role::Member,
                token_key: format!("key-{username}"),
            })
            .await
            .unwrap()
    }

    async fn post(store: &MemoryStore, author: &User) -> Post {
        store
            .create_post(NewPost {
                author_id: author.id,
                title: "Hello".to_string(),
                content: "World".to_string(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn concurrent_likes_insert_exactly_one_row() {
        let store = MemoryStore::new();
        let author = user(&store, "author").await;
        let fan = user(&store, "fan").await;
        let post = post(&store, &author).await;
        let (fan_id, post_id, author_id) = (fan.id, post.id, author.id);

        let attempts: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.create_like(fan_id, post_id, Some(author_id)).await })
            })
            .collect();

        let mut created = 0;
        let mut conflicts = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => created += 1,
                Err(StoreError::Conflict(_)) => conflicts += 1,
                Err(e) => panic!("unexpected error {e}"),
            }
        }
        assert_eq!(created, 1);
        assert_eq!(conflicts, 15);
        assert_eq!(store.unread_count(author.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unlike_removes_its_notification() {
        let store = MemoryStore::new();
        let author = user(&store, "author").await;
        let fan = user(&store, "fan").await;
        let post = post(&store, &author).await;

        store.create_like(fan.id, post.id, Some(author.id)).await.unwrap();
        store.delete_like(fan.id, post.id).await.unwrap();

        assert_eq!(store.unread_count(author.id).await.unwrap(), 0);
        assert!(matches!(
            store.delete_like(fan.id, post.id).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn deleting_a_post_cascades() {
        let store = MemoryStore::new();
        let author = user(&store, "author").await;
        let fan = user(&store, "fan").await;
        let post = post(&store, &author).await;
        store
            .create_comment(
                NewComment {
                    post_id: post.id,
                    author_id: fan.id,
                    content: "nice".to_string(),
                },
                Some(author.id),
            )
            .await
            .unwrap();
        store.create_like(fan.id, post.id, Some(author.id)).await.unwrap();

        store.delete_post(post.id).await.unwrap();

        assert!(store.comments_for_posts(&[post.id]).await.unwrap().is_empty());
        assert!(store.like_summaries(&[post.id], None).await.unwrap().is_empty());
        assert_eq!(store.unread_count(author.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn comment_on_missing_post_is_not_found() {
        let store = MemoryStore::new();
        let author = user(&store, "author").await;
        let result = store
            .create_comment(
                NewComment {
                    post_id: 42,
                    author_id: author.id,
                    content: "hello".to_string(),
                },
                None,
            )
            .await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn deleting_a_user_removes_their_footprint() {
        let store = MemoryStore::new();
        let author = user(&store, "author").await;
        let fan = user(&store, "fan").await;
        let post = post(&store, &author).await;
        store.create_like(fan.id, post.id, Some(author.id)).await.unwrap();
        store.create_follow(fan.id, author.id).await.unwrap();

        store.delete_user(fan.id).await.unwrap();

        assert_eq!(store.unread_count(author.id).await.unwrap(), 0);
        assert_eq!(store.follow_counts(author.id).await.unwrap().followers, 0);
        assert!(store.post_by_id(post.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_usernames_conflict() {
        let store = MemoryStore::new();
        user(&store, "alice").await;
        let result = store
            .create_user(NewUser {
                username: "alice".to_string(),
                email: "other@example.com".to_string(),
                password: "x".to_string(),
                bio: String::new(),
                role: Role::Member,
                token_key: "other".to_string(),
            })
            .await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn emails_conflict_regardless_of_case() {
        let store = MemoryStore::new();
        user(&store, "alice").await;
        let result = store
            .create_user(NewUser {
                username: "alice2".to_string(),
                email: "Alice@Example.com".to_string(),
                password: "x".to_string(),
                bio: String::new(),
                role: Role::Member,
                token_key: "other".to_string(),
            })
            .await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
        let found = store.user_by_email("ALICE@example.COM").await.unwrap();
        assert_eq!(found.map(|u| u.username).as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn librarian_is_replaced_not_duplicated() {
        let store = MemoryStore::new();
        let library = store.create_library("Central".to_string()).await.unwrap();
        store
            .assign_librarian(library.id, "John".to_string())
            .await
            .unwrap();
        store
            .assign_librarian(library.id, "Sarah".to_string())
            .await
            .unwrap();
        let librarian = store.librarian_for_library(library.id).await.unwrap().unwrap();
        assert_eq!(librarian.name, "Sarah");
    }
}
