pub mod catalog;
pub mod library;
pub mod login_user;
pub mod notification;
pub mod post;
pub mod register_user;
pub mod user;
