use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::{ApiJson, validated};
use crate::auth::Session;
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::Role;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/sign-in", post(sign_in))
        .route("/auth/sign-out", post(sign_out))
        .route("/auth/session", get(session))
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
struct SignInRequest {
    #[validate(email(message = "must be an email address"))]
    email: String,
    #[validate(length(min = 1, message = "is required"))]
    password: String,
}

// POST /api/auth/sign-in
async fn sign_in(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<SignInRequest>,
) -> Result<Json<Session>, AppError> {
    let req = validated(req)?;
    let session = state.auth.sign_in(req.email.trim(), &req.password).await?;
    Ok(Json(session))
}

// POST /api/auth/sign-out
async fn sign_out(State(state): State<Arc<AppState>>, user: AuthUser) -> StatusCode {
    state.auth.sign_out(&user.claims).await;
    state.checkin.forget(user.user_id);
    StatusCode::NO_CONTENT
}

#[derive(Debug, Serialize)]
struct SessionInfo {
    user_id: Uuid,
    email: String,
    role: Option<Role>,
    expires_at: i64,
}

// GET /api/auth/session
async fn session(user: AuthUser) -> Json<SessionInfo> {
    Json(SessionInfo {
        user_id: user.user_id,
        email: user.email,
        role: user.role,
        expires_at: user.claims.exp,
    })
}
