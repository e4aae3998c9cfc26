use std::collections::BTreeMap;

use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    response::{IntoResponse, Response},
    Json,
};
use hyper::StatusCode;
use serde_json::json;
use tracing::{error, warn};

use crate::store::StoreError;

#[derive(Debug)]
enum ErrorBody {
    Empty,
    Detail(String),
    Fields(BTreeMap<String, Vec<String>>),
}

/// Error returned by every route. Renders as `{"detail": "..."}` or, for
/// validation failures, as `{"field": ["message", ...]}`.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    body: ErrorBody,
}

impl AppError {
    pub fn new(status: StatusCode, message: Option<&str>) -> Self {
        Self {
            status,
            body: match message {
                Some(message) => ErrorBody::Detail(message.to_string()),
                None => ErrorBody::Empty,
            },
        }
    }

    pub fn detail(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody::Detail(message.into()),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::detail(StatusCode::BAD_REQUEST, message)
    }

    pub fn field_error(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::default();
        errors.add(field, message);
        errors.into_error()
    }

    pub fn you_have_to_be_connected_to_perform_this_action_error() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            Some("Authentication credentials were not provided."),
        )
    }

    pub fn invalid_token() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, Some("Invalid token."))
    }

    pub fn forbidden_error() -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            Some("You do not have permission to perform this action."),
        )
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, Some("Not found."))
    }

    pub fn internal_server_error() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, None)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self.body {
            ErrorBody::Empty => self.status.into_response(),
            ErrorBody::Detail(detail) => {
                (self.status, Json(json!({ "detail": detail }))).into_response()
            }
            ErrorBody::Fields(fields) => (self.status, Json(json!(fields))).into_response(),
        }
    }
}

/// Collects every invalid field of a payload before failing, so a client
/// sees all problems in one response.
#[derive(Debug, Default)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reports a missing (unless `partial`), blank or too long text field.
    /// Returns whether the value can be used.
    pub fn check_text(
        &mut self,
        field: &str,
        value: Option<&str>,
        partial: bool,
        max_len: usize,
    ) -> bool {
        match value {
            None if partial => true,
            None => {
                self.add(field, "This field is required.");
                false
            }
            Some(value) if value.trim().is_empty() => {
                self.add(field, "This field may not be blank.");
                false
            }
            Some(value) if value.chars().count() > max_len => {
                self.add(
                    field,
                    format!("Ensure this field has no more than {max_len} characters."),
                );
                false
            }
            Some(_) => true,
        }
    }

    pub fn into_error(self) -> AppError {
        AppError {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody::Fields(self.0),
        }
    }

    pub fn into_result(self) -> Result<(), AppError> {
        if self.is_empty() {
            return Ok(());
        }
        Err(self.into_error())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        warn!("Rejected JSON body : {}", rejection.body_text());
        let status = match rejection.status() {
            StatusCode::UNSUPPORTED_MEDIA_TYPE => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::detail(status, format!("JSON parse error - {}", rejection.body_text()))
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        warn!("Rejected path : {}", rejection.body_text());
        Self::not_found()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => Self::not_found(),
            StoreError::Conflict(message) => {
                warn!("Store conflict : {message}");
                Self::bad_request(message)
            }
            StoreError::Integrity(message) => {
                error!("Store integrity error : {message}");
                Self::internal_server_error()
            }
            StoreError::Database(e) => {
                error!("Database error : {e}");
                Self::internal_server_error()
            }
        }
    }
}
