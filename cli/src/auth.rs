//! Password hashing and JWT issuing/validation.

use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

pub const ACCESS_TOKEN_MINUTES: i64 = 60;
pub const REFRESH_TOKEN_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub token_type: TokenKind,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash password: {e}"))?;
    Ok(hash.to_string())
}

static DUMMY_HASH: LazyLock<String> =
    LazyLock::new(|| hash_password("nutrifit-dummy-password").unwrap_or_default());

/// A real argon2 hash matching no account's password. Login verifies against
/// it when the email is unknown so both paths cost one verification.
#[must_use]
pub fn dummy_password_hash() -> &'static str {
    DUMMY_HASH.as_str()
}

/// A malformed stored hash counts as a mismatch.
#[must_use]
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        tracing::warn!("stored password hash is unreadable");
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn issue_token(user_id: i64, kind: TokenKind, lifetime: Duration, secret: &str) -> Result<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        token_type: kind,
        iat: now.timestamp(),
        exp: (now + lifetime).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .context("Failed to encode JWT")
}

pub fn issue_access_token(user_id: i64, secret: &str) -> Result<String> {
    issue_token(
        user_id,
        TokenKind::Access,
        Duration::minutes(ACCESS_TOKEN_MINUTES),
        secret,
    )
}

pub fn issue_token_pair(user_id: i64, secret: &str) -> Result<TokenPair> {
    Ok(TokenPair {
        access: issue_access_token(user_id, secret)?,
        refresh: issue_token(
            user_id,
            TokenKind::Refresh,
            Duration::days(REFRESH_TOKEN_DAYS),
            secret,
        )?,
    })
}

/// Decode a token and return its user id. Fails on a bad signature, an
/// expired token, or a token of the wrong kind.
pub fn validate_token(token: &str, secret: &str, expected: TokenKind) -> Result<i64> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .context("Invalid token")?;
    if data.claims.token_type != expected {
        anyhow::bail!("Wrong token type");
    }
    data.claims.sub.parse().context("Invalid token subject")
}
