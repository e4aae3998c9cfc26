use axum_macros::{FromRequest, FromRequestParts};

use crate::utils::app_error::AppError;

/// `axum::Json`, rejecting malformed bodies with the crate's error format.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// `axum::extract::Path`; a segment that doesn't parse is a 404.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);
