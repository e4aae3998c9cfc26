use tracing::warn;

use crate::{models::account::User, AppState};

use super::{app_error::AppError, token::Token};

/// Resolves an access token to its user. `Ok(None)` means the token is not
/// valid (tampered, expired or revoked by a logout).
pub async fn authentificate(app_state: &AppState, token: &str) -> Result<Option<User>, AppError> {
    let token_key = match Token::decode(token, &app_state.cipher) {
        Ok(token_key) => token_key,
        Err(_) => return Ok(None),
    };
    let user = app_state.store.user_by_token_key(&token_key).await?;
    if user.is_none() {
        warn!("Token bound to an unknown or rotated key");
    }
    Ok(user)
}

pub fn issue_token(app_state: &AppState, user: &User) -> String {
    Token::create(
        user.token_key.clone(),
        app_state.config.token_lifetime,
        &app_state.cipher,
    )
}
