use std::collections::HashMap;

use tracing::error;

use crate::{store::Store, structs::user::PublicUser};

use super::app_error::AppError;

/// Loads the public representation of every user in `ids`, in one query.
pub async fn public_users(
    store: &dyn Store,
    ids: impl IntoIterator<Item = i64>,
) -> Result<HashMap<i64, PublicUser>, AppError> {
    let mut ids: Vec<i64> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    Ok(store
        .users_by_ids(&ids)
        .await?
        .iter()
        .map(|user| (user.id, PublicUser::from(user)))
        .collect())
}

pub fn pick(users: &HashMap<i64, PublicUser>, id: i64) -> Result<PublicUser, AppError> {
    users.get(&id).cloned().ok_or_else(|| {
        error!("User {id} referenced by a row does not exist");
        AppError::internal_server_error()
    })
}
