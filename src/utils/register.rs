use email_address::EmailAddress;
use rand::RngCore;
use sha2::{Digest, Sha512};
use tracing::warn;

use crate::structs::register_user::RegisterUser;
use crate::utils::app_error::{AppError, FieldErrors};

const SALT_LEN: usize = 16;

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn check_username(username: &str, errors: &mut FieldErrors) {
    let len = username.chars().count();
    if !(3..=30).contains(&len) {
        warn!("Wrong username size : {username}");
        errors.add(
            "username",
            "Username must contain between 3 and 30 characters.",
        );
        return;
    }

    for (i, c) in username.char_indices() {
        if i == 0 {
            if !c.is_ascii_alphabetic() {
                warn!("The username has to begin with a letter : {username}");
                errors.add("username", "Username must begin with a letter.");
                return;
            }
            continue;
        }
        if !c.is_ascii_alphanumeric() && c != '_' {
            warn!("The username has to contain only letters, digits and underscores : {username}");
            errors.add(
                "username",
                "Username may only contain letters, digits and underscores.",
            );
            return;
        }
    }
}

pub fn check_email_address(email: &str, errors: &mut FieldErrors) {
    if !EmailAddress::is_valid(email) {
        warn!("Invalid email `{email}`");
        errors.add("email", "Enter a valid email address.");
    }
}

/// Checks every field of a registration and reports all problems at once.
pub fn check_register_infos(user: &RegisterUser) -> Result<(), AppError> {
    let mut errors = FieldErrors::default();

    check_username(&user.username, &mut errors);
    check_email_address(&user.email, &mut errors);

    if user.password.chars().count() < 8 {
        warn!("Password of `{}` too short", user.username);
        errors.add(
            "password",
            "This password is too short. It must contain at least 8 characters.",
        );
    }

    if user.password != user.password2 {
        warn!("Passwords of `{}` don't match", user.username);
        errors.add("password2", "Password fields didn't match.");
    }

    errors.into_result()
}

/// Salted SHA-512, stored as `salt$digest`.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = to_hex(&salt);
    format!("{salt}${}", digest(&salt, password))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, hash)) => constant_time_eq(digest(salt, password).as_bytes(), hash.as_bytes()),
        None => false,
    }
}

/// Compares without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(salt);
    hasher.update(password);
    format!("{:x}", hasher.finalize())
}

/// Random per-user key that every access token is bound to.
pub fn new_token_key() -> String {
    let mut key = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut key);
    to_hex(&key)
}
