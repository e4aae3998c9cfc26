use std::{env, net::SocketAddr};

use rand::RngCore;
use thiserror::Error;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_TOKEN_LIFETIME_DAYS: i64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Please set the `{0}` environment variable")]
    Missing(&'static str),

    #[error("`{name}` is invalid : {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Runtime settings, read from the environment (and `.env`) at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// No URL means the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    /// AES-256 key used to seal access tokens.
    pub encoding_key: [u8; 32],
    pub front_url: Option<String>,
    pub token_lifetime: chrono::Duration,
    /// Accounts registered under these names get the admin role.
    pub admin_usernames: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let mut encoding_key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut encoding_key);
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            database_url: None,
            database_max_connections: DEFAULT_MAX_CONNECTIONS,
            encoding_key,
            front_url: None,
            token_lifetime: chrono::Duration::days(DEFAULT_TOKEN_LIFETIME_DAYS),
            admin_usernames: Vec::new(),
        }
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match optional(name) {
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn token_lifetime(days: i64) -> Result<chrono::Duration, ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        name: "TOKEN_LIFETIME_DAYS",
        reason: reason.to_string(),
    };
    if days <= 0 {
        return Err(invalid("has to be positive"));
    }
    let lifetime = chrono::Duration::try_days(days).ok_or_else(|| invalid("is too large"))?;
    chrono::Utc::now()
        .checked_add_signed(lifetime)
        .ok_or_else(|| invalid("is too large"))?;
    Ok(lifetime)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = parsed("BIND_ADDR", Config::default().bind_addr)?;

        let secret_key = optional("ENCODING_KEY").ok_or(ConfigError::Missing("ENCODING_KEY"))?;
        let encoding_key: [u8; 32] =
            secret_key
                .as_bytes()
                .try_into()
                .map_err(|_| ConfigError::Invalid {
                    name: "ENCODING_KEY",
                    reason: format!("the key has to be 32 bytes long, got {}", secret_key.len()),
                })?;

        let token_lifetime = token_lifetime(parsed(
            "TOKEN_LIFETIME_DAYS",
            DEFAULT_TOKEN_LIFETIME_DAYS,
        )?)?;

        let admin_usernames = optional("ADMIN_USERNAMES")
            .map(|raw| {
                raw.split(',')
                    .map(|name| name.trim().to_lowercase())
                    .filter(|name| !name.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            bind_addr,
            database_url: optional("DATABASE_URL"),
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            encoding_key,
            front_url: optional("FRONT_URL"),
            token_lifetime,
            admin_usernames,
        })
    }

    pub fn is_admin_username(&self, username: &str) -> bool {
        self.admin_usernames.iter().any(|name| name == username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_a_random_key() {
        assert_ne!(Config::default().encoding_key, Config::default().encoding_key);
    }

    #[test]
    fn admin_usernames_are_matched_exactly() {
        let config = Config {
            admin_usernames: vec!["root".to_string()],
            ..Config::default()
        };
        assert!(config.is_admin_username("root"));
        assert!(!config.is_admin_username("rooted"));
    }

    #[test]
    fn token_lifetime_is_bounded() {
        assert_eq!(token_lifetime(30).unwrap(), chrono::Duration::days(30));
        for days in [0, -1, 100_000_000, i64::MAX] {
            assert!(
                matches!(token_lifetime(days), Err(ConfigError::Invalid { .. })),
                "{days} days should be rejected"
            );
        }
    }
}
