//! Password hashing and the cookie session that identifies a user.

use actix_session::Session;
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use once_cell::sync::OnceCell;

/// Session key holding the logged-in user's id.
pub const SESSION_USER_KEY: &str = "user_id";

static ARGON2: OnceCell<Argon2<'static>> = OnceCell::new();

pub fn init() {
    if ARGON2.set(Argon2::default()).is_err() {
        log::warn!("session::init called twice");
    }
}

pub fn get_argon2() -> &'static Argon2<'static> {
    ARGON2.get_or_init(Argon2::default)
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(get_argon2()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// False for a wrong password and for a stored hash that does not parse.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => get_argon2()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            log::error!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}

/// Binds the session to `user_id`, rotating the cookie.
pub fn start_session(session: &Session, user_id: i32) -> Result<(), actix_web::Error> {
    session.renew();
    session
        .insert(SESSION_USER_KEY, user_id)
        .map_err(|e| {
            log::error!("Failed to write session: {}", e);
            actix_web::error::ErrorInternalServerError("Session error")
        })
}

pub fn end_session(session: &Session) {
    session.purge();
}

pub fn session_user_id(session: &Session) -> Option<i32> {
    match session.get::<i32>(SESSION_USER_KEY) {
        Ok(id) => id,
        Err(e) => {
            log::debug!("Discarding unreadable session: {}", e);
            None
        }
    }
}
