use axum::{
    extract::State,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::{ApiJson, ApiPath};
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::{Role, UnknownRole, UserProfile};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{id}/role", put(update_role))
}

// GET /api/users
async fn list_users(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<UserProfile>>, AppError> {
    user.require(&state, &[Role::Admin])?;
    let profiles = state.store.list_profiles().await?;
    Ok(Json(profiles))
}

// PUT /api/users/{id}/role
#[derive(Debug, Deserialize)]
struct UpdateRoleRequest {
    role: String,
}

async fn update_role(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath(user_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateRoleRequest>,
) -> Result<Json<UserProfile>, AppError> {
    user.require(&state, &[Role::Admin])?;
    let role: Role = req.role.parse().map_err(|e: UnknownRole| {
        let known: Vec<&str> = Role::ALL.iter().map(Role::as_str).collect();
        AppError::validation(format!("{e}, expected one of {}", known.join(", ")))
    })?;

    let profile = state.store.update_role(user_id, role).await?;
    Ok(Json(profile))
}
