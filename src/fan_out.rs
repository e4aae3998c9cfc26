//! Who hears about an engagement. The store writes the notification row in
//! the same transaction as the engagement itself; this module decides the
//! recipient beforehand and pushes the stored row to live streams after.

use tracing::warn;

use crate::{models::notification::Notification, utils::notification::expand_notification, AppState};

/// The owner of the engaged object, unless the owner is the actor.
pub fn recipient_for(actor_id: i64, owner_id: i64) -> Option<i64> {
    (actor_id != owner_id).then_some(owner_id)
}

/// Sends a stored notification to the recipient's open streams, if any.
pub async fn publish(app_state: &AppState, notification: Notification) {
    let recipient_id = notification.recipient_id;
    if app_state.event_tracker.connection_count(recipient_id).await == 0 {
        return;
    }
    let response = match expand_notification(app_state.store.as_ref(), notification).await {
        Ok(response) => response,
        Err(e) => {
            warn!("Cannot expand notification for user {recipient_id} : {e:?}");
            return;
        }
    };
    match serde_json::to_string(&response) {
        Ok(content) => app_state.event_tracker.notify(recipient_id, content).await,
        Err(e) => warn!("Cannot serialize notification for user {recipient_id} : {e}"),
    }
}

/// Publishes the notification produced by a store call, if it made one.
pub async fn publish_optional(app_state: &AppState, notification: Option<Notification>) {
    if let Some(notification) = notification {
        publish(app_state, notification).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_engagement_notifies_nobody() {
        assert_eq!(recipient_for(3, 3), None);
        assert_eq!(recipient_for(3, 4), Some(4));
    }
}
