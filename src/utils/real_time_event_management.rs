use std::{collections::HashMap, sync::Arc};

use futures_channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;
use tracing::{info, warn};

pub const NOTIFICATION_EVENT_NAME: &str = "notification";

type Connections = Arc<RwLock<HashMap<i64, Vec<UnboundedSender<String>>>>>;

/// Open notification streams, keyed by the id of the user listening.
#[derive(Default, Clone)]
pub struct EventTracker {
    connections: Connections,
}

impl EventTracker {
    /// Registers a new stream for `user_id`; the receiver ends when the
    /// tracker drops its sender. Streams whose client went away are
    /// forgotten at the same time.
    pub async fn subscribe(&self, user_id: i64) -> UnboundedReceiver<String> {
        let (sender, receiver) = mpsc::unbounded();
        let mut connections = self.connections.write().await;
        let senders = connections.entry(user_id).or_default();
        senders.retain(|sender| !sender.is_closed());
        senders.push(sender);
        info!("User {user_id} opened a notification stream");
        receiver
    }

    /// Sends `content` to every open stream of `user_id`, forgetting the
    /// streams whose client went away.
    pub async fn notify(&self, user_id: i64, content: String) {
        let mut connections = self.connections.write().await;
        let Some(senders) = connections.get_mut(&user_id) else {
            return;
        };
        senders.retain(|sender| match sender.unbounded_send(content.clone()) {
            Ok(()) => true,
            Err(e) => {
                if !e.is_disconnected() {
                    warn!("Error sending event to user {user_id} : {e}");
                }
                false
            }
        });
        if senders.is_empty() {
            connections.remove(&user_id);
            info!("User {user_id} has no notification stream left");
        }
    }

    /// Open streams of `user_id`.
    pub async fn connection_count(&self, user_id: i64) -> usize {
        self.connections
            .read()
            .await
            .get(&user_id)
            .map_or(0, |senders| {
                senders.iter().filter(|sender| !sender.is_closed()).count()
            })
    }
}
