pub mod account;
pub mod catalog;
pub mod notification;
pub mod post;
