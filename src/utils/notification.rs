use crate::{
    models::notification::Notification, store::Store,
    structs::notification::NotificationResponse,
};

use super::{
    app_error::AppError,
    user::{pick, public_users},
};

pub async fn expand_notifications(
    store: &dyn Store,
    notifications: Vec<Notification>,
) -> Result<Vec<NotificationResponse>, AppError> {
    let users = public_users(
        store,
        notifications
            .iter()
            .flat_map(|n| [n.recipient_id, n.actor_id]),
    )
    .await?;
    notifications
        .into_iter()
        .map(|notification| {
            Ok(NotificationResponse {
                id: notification.id,
                recipient: pick(&users, notification.recipient_id)?,
                actor: pick(&users, notification.actor_id)?,
                verb: notification.target.verb(),
                target_type: notification.target.type_name(),
                target_id: notification.target.id(),
                created_at: notification.created_at,
                read: notification.read,
            })
        })
        .collect()
}

pub async fn expand_notification(
    store: &dyn Store,
    notification: Notification,
) -> Result<NotificationResponse, AppError> {
    expand_notifications(store, vec![notification])
        .await?
        .pop()
        .ok_or_else(AppError::internal_server_error)
}
