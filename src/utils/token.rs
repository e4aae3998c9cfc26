use base64::{engine::general_purpose, Engine};
use chrono::{DateTime, Duration, Utc};
use libaes::Cipher;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::utils::app_error::AppError;

const NONCE_LEN: usize = 16;
const BLOCK_LEN: usize = 16;

/// Claims sealed inside an access token
#[derive(Debug, Serialize, Deserialize)]
pub struct Token {
    exp: i64,
    sub: String,
}

impl Token {
    /// Create an encrypted and encoded token
    pub fn create(sub: String, exp_in: Duration, cipher: &Cipher) -> String {
        // Lifetimes past the calendar's end never expire.
        let exp = Utc::now()
            .checked_add_signed(exp_in)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
            .timestamp();

        let claims = serde_json::to_string(&Token { exp, sub }).unwrap_or_default();

        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let encrypted = cipher.cbc_encrypt(&nonce, claims.as_bytes());
        // nonce first, then the ciphertext
        general_purpose::STANDARD.encode([&nonce, encrypted.as_slice()].concat())
    }

    /// Decode a token and return its subject, failing on tampered or expired tokens
    pub fn decode(token: &str, cipher: &Cipher) -> Result<String, AppError> {
        let decoded = general_purpose::STANDARD.decode(token).map_err(|e| {
            warn!("Error decoding token : {e}");
            AppError::invalid_token()
        })?;

        if decoded.len() <= NONCE_LEN || (decoded.len() - NONCE_LEN) % BLOCK_LEN != 0 {
            warn!("Token has a wrong length : {}", decoded.len());
            return Err(AppError::invalid_token());
        }
        let (nonce, data) = decoded.split_at(NONCE_LEN);

        let decrypted = cipher.cbc_decrypt(nonce, data);
        let claims = String::from_utf8(decrypted).map_err(|e| {
            warn!("Error decrypting token : {e}");
            AppError::invalid_token()
        })?;

        let token: Token = serde_json::from_str(&claims).map_err(|e| {
            warn!("Error deserializing token claims : {e}");
            AppError::invalid_token()
        })?;

        if token.exp <= Utc::now().timestamp() {
            warn!("Expired token, expire timestamp : {}", token.exp);
            return Err(AppError::invalid_token());
        }

        Ok(token.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> Cipher {
        Cipher::new_256(b"0123456789abcdef0123456789abcdef")
    }

    #[test]
    fn token_carries_its_subject() {
        let cipher = cipher();
        let token = Token::create("key-42".to_string(), Duration::days(1), &cipher);
        assert_eq!(Token::decode(&token, &cipher).unwrap(), "key-42");
    }

    #[test]
    fn expired_token_is_rejected() {
        let cipher = cipher();
        let token = Token::create("key-42".to_string(), Duration::seconds(-10), &cipher);
        assert!(Token::decode(&token, &cipher).is_err());
    }

    #[test]
    fn garbage_is_rejected_without_panicking() {
        let cipher = cipher();
        let unaligned = general_purpose::STANDARD.encode([7u8; 33]);
        for token in ["", "not base64!", "c2hvcnQ=", unaligned.as_str()] {
            assert!(Token::decode(token, &cipher).is_err());
        }
    }

    #[test]
    fn huge_lifetime_does_not_overflow() {
        let cipher = cipher();
        let token = Token::create("key-42".to_string(), Duration::days(365_000_000), &cipher);
        assert_eq!(Token::decode(&token, &cipher).unwrap(), "key-42");
    }

    #[test]
    fn token_from_another_key_is_rejected() {
        let token = Token::create("key-42".to_string(), Duration::days(1), &cipher());
        let other = Cipher::new_256(b"fedcba9876543210fedcba9876543210");
        assert!(Token::decode(&token, &other).is_err());
    }
}
