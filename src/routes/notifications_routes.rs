use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    Json,
};
use hyper::StatusCode;
use tracing::{info, warn};

use crate::{
    extractors::{app_extractors::AppPath, auth_extractor::RequiredUser},
    models::{account::User, notification::Notification},
    structs::notification::{NotificationResponse, UnreadCount},
    utils::{
        app_error::AppError,
        filters::NotificationFilter,
        notification::{expand_notification, expand_notifications},
        pagination::{PaginatedResponse, PaginationParams},
    },
    AppState,
};

/// Someone else's notification is reported as missing.
async fn own_notification(
    app_state: &AppState,
    auth_user: &User,
    id: i64,
) -> Result<Notification, AppError> {
    match app_state.store.notification_by_id(id).await? {
        Some(notification) if notification.recipient_id == auth_user.id => Ok(notification),
        Some(_) => {
            warn!("User {} asked for notification {id} of another user", auth_user.id);
            Err(AppError::not_found())
        }
        None => Err(AppError::not_found()),
    }
}

pub async fn list_notifications_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<PaginatedResponse<NotificationResponse>>, AppError> {
    let filter = NotificationFilter::from_query(&params)?;
    let page = PaginationParams::from_query(&params)?;

    let notifications = app_state
        .store
        .list_notifications(auth_user.id, &filter, page)
        .await?;
    let results = expand_notifications(app_state.store.as_ref(), notifications.items).await?;
    Ok(Json(PaginatedResponse::new(page, notifications.count, results)?))
}

pub async fn get_notification_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    AppPath(id): AppPath<i64>,
) -> Result<Json<NotificationResponse>, AppError> {
    let notification = own_notification(&app_state, &auth_user, id).await?;
    Ok(Json(
        expand_notification(app_state.store.as_ref(), notification).await?,
    ))
}

pub async fn mark_read_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
    AppPath(id): AppPath<i64>,
) -> Result<StatusCode, AppError> {
    let notification = own_notification(&app_state, &auth_user, id).await?;
    app_state.store.mark_read(notification.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_read_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
) -> Result<StatusCode, AppError> {
    let flipped = app_state.store.mark_all_read(auth_user.id).await?;
    info!("User {} marked {flipped} notifications as read", auth_user.id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unread_count_route(
    State(app_state): State<AppState>,
    RequiredUser(auth_user): RequiredUser,
) -> Result<Json<UnreadCount>, AppError> {
    let count = app_state.store.unread_count(auth_user.id).await?;
    Ok(Json(UnreadCount { count }))
}
