pub mod authors_routes;
pub mod books_routes;
pub mod comments_routes;
pub mod dashboard_routes;
pub mod follow_user_route;
pub mod libraries_routes;
pub mod likes_routes;
pub mod login_route;
pub mod notifications_routes;
pub mod posts_routes;
pub mod register_route;
pub mod sse;
pub mod users_routes;
