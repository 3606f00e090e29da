//! Credential store.
//!
//! Owns password hashing and verification, reset-token generation and
//! hashing, and the password-changed bookkeeping that backs token
//! revocation. Plaintext passwords exist only transiently in here; only
//! argon2 hashes and sha256 token digests are persisted.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::Rng;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::models::User;
use super::validation;
use super::{now_timestamp, DbPool, StoreError};

/// Reset tokens are valid for ten minutes.
const RESET_TOKEN_TTL_MINUTES: i64 = 10;

/// Skew applied to `password_changed_at` so a token issued in the same
/// instant as the change is still accepted.
const PASSWORD_CHANGED_SKEW_SECONDS: i64 = 1;

pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a stored hash. The comparison is the scheme's
/// own constant-time verify.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random high-entropy token
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// One-way hash of a token for storage
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn timestamp_offset(seconds: i64) -> String {
    (chrono::Utc::now() + chrono::Duration::seconds(seconds))
        .to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Create a user. Validates the submitted fields, normalizes the email to
/// lowercase, hashes the password, and discards the confirmation.
pub async fn create(pool: &DbPool, new: NewUser) -> Result<User, StoreError> {
    let mut errors = Vec::new();
    if let Err(e) = validation::validate_user_name(&new.name) {
        errors.push(e);
    }
    if let Err(e) = validation::validate_email(&new.email) {
        errors.push(e);
    }
    if let Err(e) = validation::validate_password_pair(&new.password, &new.password_confirm) {
        errors.push(e);
    }
    if !errors.is_empty() {
        return Err(StoreError::Validation(errors));
    }

    let id = Uuid::new_v4().to_string();
    let email = new.email.trim().to_lowercase();
    let password_hash =
        hash_password(&new.password).map_err(|_| StoreError::Database(sqlx::Error::Protocol(
            "password hashing failed".into(),
        )))?;
    let now = now_timestamp();

    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role, active, created_at, updated_at)
         VALUES (?, ?, ?, ?, 'user', 1, ?, ?)",
    )
    .bind(&id)
    .bind(new.name.trim())
    .bind(&email)
    .bind(&password_hash)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .map_err(|e| StoreError::from_sqlx(e, "email"))?;

    find_by_id(pool, &id)
        .await?
        .ok_or(StoreError::NotFound)
}

pub async fn find_by_id(pool: &DbPool, id: &str) -> Result<Option<User>, StoreError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn find_by_email(pool: &DbPool, email: &str) -> Result<Option<User>, StoreError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(email.trim().to_lowercase())
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Rehash and persist a new password. `password_changed_at` is set slightly
/// in the past so sessions issued in the same instant stay valid; the reset
/// fields are cleared as a side effect.
pub async fn update_password(
    pool: &DbPool,
    user_id: &str,
    new_password: &str,
) -> Result<(), StoreError> {
    let password_hash = hash_password(new_password).map_err(|_| {
        StoreError::Database(sqlx::Error::Protocol("password hashing failed".into()))
    })?;
    let changed_at = timestamp_offset(-PASSWORD_CHANGED_SKEW_SECONDS);
    let now = now_timestamp();

    sqlx::query(
        "UPDATE users
         SET password_hash = ?, password_changed_at = ?,
             password_reset_token = NULL, password_reset_expires = NULL,
             updated_at = ?
         WHERE id = ?",
    )
    .bind(&password_hash)
    .bind(&changed_at)
    .bind(&now)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Generate a reset token for the user, persisting only its hash and a
/// ten-minute expiry. Returns the raw token for out-of-band delivery.
pub async fn create_reset_token(pool: &DbPool, user_id: &str) -> Result<String, StoreError> {
    let token = generate_token();
    let token_hash = hash_token(&token);
    let expires_at = timestamp_offset(RESET_TOKEN_TTL_MINUTES * 60);
    let now = now_timestamp();

    sqlx::query(
        "UPDATE users
         SET password_reset_token = ?, password_reset_expires = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&token_hash)
    .bind(&expires_at)
    .bind(&now)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(token)
}

/// Clear the reset fields, e.g. after a failed delivery.
pub async fn clear_reset_token(pool: &DbPool, user_id: &str) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE users
         SET password_reset_token = NULL, password_reset_expires = NULL, updated_at = ?
         WHERE id = ?",
    )
    .bind(now_timestamp())
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Find the user holding an unexpired reset token matching the raw token.
pub async fn find_by_reset_token(
    pool: &DbPool,
    raw_token: &str,
) -> Result<Option<User>, StoreError> {
    let token_hash = hash_token(raw_token);
    let user = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE password_reset_token = ? AND password_reset_expires > ?",
    )
    .bind(&token_hash)
    .bind(now_timestamp())
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

/// Whether the password was changed after a token with the given issue time
/// (seconds since epoch) was signed.
pub fn changed_password_after(user: &User, token_issued_at: i64) -> bool {
    let Some(changed_at) = &user.password_changed_at else {
        return false;
    };
    match chrono::DateTime::parse_from_rfc3339(changed_at) {
        Ok(ts) => token_issued_at < ts.timestamp(),
        Err(_) => false,
    }
}
