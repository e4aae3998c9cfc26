use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::models::account::{FollowCounts, Role, User};

/// What other users get to see of an account.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub bio: String,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            bio: user.bio.clone(),
            role: user.role,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    /// Only present on the caller's own profile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub bio: String,
    pub role: Role,
    pub followers_count: u64,
    pub following_count: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl UserProfile {
    pub fn new(user: &User, counts: FollowCounts, with_email: bool) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: with_email.then(|| user.email.clone()),
            bio: user.bio.clone(),
            role: user.role,
            followers_count: counts.followers,
            following_count: counts.following,
            created_at: user.created_at,
        }
    }
}

#[derive(Deserialize)]
pub struct UpdateUser {
    pub email: Option<String>,
    pub bio: Option<String>,
}

#[derive(Deserialize)]
pub struct RoleUpdate {
    pub role: Option<String>,
}
