pub mod app_error;
pub mod authentification;
pub mod book;
pub mod filters;
pub mod notification;
pub mod ordering;
pub mod pagination;
pub mod post;
pub mod real_time_event_management;
pub mod register;
pub mod token;
pub mod user;
