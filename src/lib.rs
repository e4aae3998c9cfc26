//! Social reading API: accounts and follows, posts with comments and likes,
//! notifications, a book catalog and libraries with role dashboards.

pub mod config;
pub mod extractors;
pub mod fan_out;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod store;
pub mod structs;
pub mod utils;

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use hyper::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    http::HeaderValue,
    Method,
};
use libaes::Cipher;
use tower_http::cors::CorsLayer;
use tracing::warn;

use config::Config;
use middleware::{
    logger_middleware::logger_middleware,
    role_middleware::{
        role_middleware, RoleGate, ADMIN_ONLY, LIBRARIAN_ONLY, LIBRARY_STAFF, MEMBER_ONLY,
    },
};
use routes::{
    authors_routes::*, books_routes::*, comments_routes::*, dashboard_routes::*,
    follow_user_route::*, libraries_routes::*, likes_routes::*, login_route::*,
    notifications_routes::*, posts_routes::*, register_route::register_route,
    sse::notifications_stream_route, users_routes::*,
};
use store::Store;
use utils::real_time_event_management::EventTracker;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub cipher: Arc<Cipher>,
    pub config: Arc<Config>,
    pub event_tracker: EventTracker,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        Self {
            store,
            cipher: Arc::new(Cipher::new_256(&config.encoding_key)),
            config: Arc::new(config),
            event_tracker: EventTracker::default(),
        }
    }
}

fn cors_layer(front_url: Option<&str>) -> CorsLayer {
    let origin = front_url.and_then(|url| match url.parse::<HeaderValue>() {
        Ok(origin) => Some(origin),
        Err(e) => {
            warn!("Ignoring FRONT_URL `{url}` : {e}");
            None
        }
    });

    match origin {
        Some(origin) => CorsLayer::new()
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
            ])
            .allow_headers([AUTHORIZATION, CONTENT_TYPE])
            .allow_credentials(true)
            .allow_origin(origin),
        None => CorsLayer::permissive(),
    }
}

pub fn build_router(app_state: AppState) -> Router {
    let gate = |allowed| {
        axum_middleware::from_fn_with_state(
            RoleGate::new(app_state.clone(), allowed),
            role_middleware,
        )
    };

    let accounts = Router::new()
        .route("/users", get(list_users_route).post(register_route))
        .route("/users/profile", get(profile_route))
        .route(
            "/users/:id",
            get(get_user_route)
                .patch(update_user_route)
                .delete(delete_user_route),
        )
        .route("/users/:id/role", put(update_role_route).layer(gate(ADMIN_ONLY)))
        .route("/login", post(login_route))
        .route("/logout", post(logout_route))
        .route("/follow/:id", post(follow_user_route))
        .route("/unfollow/:id", post(unfollow_user_route))
        .route("/feed", get(feed_route));

    let social = Router::new()
        .route("/posts", get(list_posts_route).post(create_post_route))
        .route(
            "/posts/:id",
            get(get_post_route)
                .put(update_post_route)
                .patch(update_post_route)
                .delete(delete_post_route),
        )
        .route("/posts/:id/comment", post(comment_on_post_route))
        .route("/posts/:id/like", post(like_post_route))
        .route("/posts/:id/unlike", post(unlike_post_route))
        .route("/posts/:id/likes", get(post_likes_route))
        .route("/comments", get(list_comments_route).post(create_comment_route))
        .route(
            "/comments/:id",
            get(get_comment_route)
                .put(update_comment_route)
                .patch(update_comment_route)
                .delete(delete_comment_route),
        )
        .route("/notifications", get(list_notifications_route))
        .route("/notifications/stream", get(notifications_stream_route))
        .route("/notifications/mark_all_read", post(mark_all_read_route))
        .route(
            "/notifications/unread_count",
            get(unread_count_route).post(unread_count_route),
        )
        .route("/notifications/:id", get(get_notification_route))
        .route("/notifications/:id/mark_read", post(mark_read_route));

    let catalog = Router::new()
        .route("/authors", get(list_authors_route).post(create_author_route))
        .route(
            "/authors/:id",
            get(get_author_route)
                .put(update_author_route)
                .patch(update_author_route)
                .delete(delete_author_route),
        )
        .route("/books", get(list_books_route).post(create_book_route))
        .route(
            "/books/bulk",
            post(bulk_create_books_route).delete(bulk_delete_books_route),
        )
        .route(
            "/books/:id",
            get(get_book_route)
                .put(update_book_route)
                .patch(update_book_route)
                .delete(delete_book_route),
        );

    let libraries = Router::new()
        .route(
            "/libraries",
            get(list_libraries_route).merge(post(create_library_route).layer(gate(ADMIN_ONLY))),
        )
        .route("/libraries/:id", get(get_library_route))
        .route(
            "/libraries/:id/librarian",
            put(assign_librarian_route).layer(gate(ADMIN_ONLY)),
        )
        .route(
            "/libraries/:id/books",
            post(add_library_book_route).layer(gate(LIBRARY_STAFF)),
        )
        .route(
            "/libraries/:id/books/:book_id",
            delete(remove_library_book_route).layer(gate(LIBRARY_STAFF)),
        )
        .route("/dashboard/admin", get(admin_dashboard_route).layer(gate(ADMIN_ONLY)))
        .route(
            "/dashboard/librarian",
            get(librarian_dashboard_route).layer(gate(LIBRARIAN_ONLY)),
        )
        .route("/dashboard/member", get(member_dashboard_route).layer(gate(MEMBER_ONLY)));

    let cors = cors_layer(app_state.config.front_url.as_deref());

    Router::new()
        .nest(
            "/api",
            accounts.merge(social).merge(catalog).merge(libraries),
        )
        .layer(cors)
        .layer(axum_middleware::from_fn(logger_middleware))
        .with_state(app_state)
}
