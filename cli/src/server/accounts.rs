use anyhow::Context;
use axum::{Extension, Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{ApiError, AppState, AuthUser};
use crate::auth::{self, TokenKind, TokenPair};
use nutrifit_core::models::{NewUser, User};

#[derive(Deserialize, Validate)]
pub(super) struct RegisterRequest {
    #[validate(email(message = "Enter a valid email address"))]
    email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    password: String,
    #[serde(default)]
    #[validate(length(max = 150))]
    first_name: String,
    #[serde(default)]
    #[validate(length(max = 150))]
    last_name: String,
}

#[derive(Deserialize)]
pub(super) struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub(super) struct RefreshRequest {
    refresh: String,
}

#[derive(Serialize)]
pub(super) struct AuthResponse {
    user: User,
    tokens: TokenPair,
}

#[derive(Serialize)]
pub(super) struct AccessResponse {
    access: String,
}

pub(super) async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    req.validate()?;
    let password_hash = auth::hash_password(&req.password)?;

    // Check and insert under one lock.
    let user = {
        let db = state.db();
        if db.email_exists(&req.email)? {
            return Err(ApiError::BadRequest(
                "A user with this email already exists".to_string(),
            ));
        }
        db.create_user(&NewUser {
            email: req.email,
            password_hash,
            first_name: req.first_name,
            last_name: req.last_name,
        })?
    };
    tracing::info!(user_id = user.id, "user registered");

    let tokens = auth::issue_token_pair(user.id, &state.jwt_secret)?;
    Ok((StatusCode::CREATED, Json(AuthResponse { user, tokens })))
}

pub(super) async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let credentials = state.db().get_user_credentials(&req.email)?;

    // Unknown emails still pay for one argon2 verification.
    let stored_hash = credentials
        .as_ref()
        .map_or(auth::dummy_password_hash(), |c| c.password_hash.as_str());
    let password_ok = auth::verify_password(&req.password, stored_hash);

    let user = credentials
        .filter(|c| password_ok && c.user.is_active)
        .map(|c| c.user)
        .ok_or(ApiError::Unauthorized("Invalid credentials"))?;

    let tokens = auth::issue_token_pair(user.id, &state.jwt_secret)?;
    Ok(Json(AuthResponse { user, tokens }))
}

pub(super) async fn refresh_token(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<AccessResponse>, ApiError> {
    const REJECTED: ApiError = ApiError::Unauthorized("Invalid or expired refresh token");

    let user_id = auth::validate_token(&req.refresh, &state.jwt_secret, TokenKind::Refresh)
        .map_err(|_| REJECTED)?;
    let active = state
        .db()
        .get_user(user_id)?
        .is_some_and(|u| u.is_active);
    if !active {
        return Err(REJECTED);
    }

    let access = auth::issue_access_token(user_id, &state.jwt_secret)?;
    Ok(Json(AccessResponse { access }))
}

pub(super) async fn me(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .db()
        .get_user(user_id)?
        .context("authenticated user vanished")?;
    Ok(Json(user))
}

pub(super) async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
