use serde::Serialize;
use time::OffsetDateTime;

use super::user::PublicUser;

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: i64,
    pub recipient: PublicUser,
    pub actor: PublicUser,
    pub verb: &'static str,
    pub target_type: &'static str,
    pub target_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub read: bool,
}

#[derive(Serialize)]
pub struct UnreadCount {
    pub count: u64,
}
