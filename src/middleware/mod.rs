use axum::{
    extract::{FromRequestParts, Query},
    http::{header, request::Parts},
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::Claims;
use crate::error::AppError;
use crate::models::Role;
use crate::AppState;

/// The signed-in caller, with the role looked up for this request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: Option<Role>,
    pub claims: Claims,
}

impl AuthUser {
    /// Role gate for mutation routes. A no-op when role guards are disabled.
    pub fn require(&self, state: &AppState, allowed: &[Role]) -> Result<(), AppError> {
        if !state.config.features.enable_role_guards {
            return Ok(());
        }
        match self.role {
            Some(role) if allowed.contains(&role) => Ok(()),
            Some(role) => Err(AppError::Forbidden(role.to_string())),
            None => Err(AppError::Forbidden("none".to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    access_token: Option<String>,
}

// Browsers cannot set headers on WebSocket upgrades, so `access_token`
// in the query string is accepted as well.
fn bearer_token(parts: &Parts) -> Option<String> {
    let from_header = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string());

    from_header.or_else(|| {
        Query::<TokenQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(query)| query.access_token)
            .filter(|token| !token.is_empty())
    })
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AppError::Unauthorized)?;
        let claims = state.auth.verify(&token).await?;
        let role = state.auth.role_of(claims.sub).await?;

        Ok(AuthUser {
            user_id: claims.sub,
            email: claims.email.clone(),
            role,
            claims,
        })
    }
}
