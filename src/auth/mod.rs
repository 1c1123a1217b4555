//! Sessions for box-office and door staff.
//!
//! A session is an HS256 token carrying the account id. Roles are not baked
//! into the token: they are looked up on every request, so a role change
//! applies immediately. Signing out revokes the token id until it expires.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::error::AppError;
use crate::models::Role;
use crate::store::Store;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: i64,
    pub jti: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub user_id: Uuid,
    pub email: String,
    pub role: Option<Role>,
    pub expires_at: i64,
}

pub struct AuthService {
    store: Arc<Store>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    // jti -> exp
    revoked: RwLock<HashMap<Uuid, i64>>,
}

impl AuthService {
    pub fn new(store: Arc<Store>, config: &JwtConfig) -> Self {
        Self {
            store,
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            ttl: Duration::hours(config.expires_in_hours),
            revoked: RwLock::new(HashMap::new()),
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let account = self
            .store
            .find_account(email)
            .await?
            .filter(|a| a.verify_password(password))
            .ok_or_else(|| {
                warn!(email, "Rejected sign-in");
                AppError::Unauthorized
            })?;

        let claims = Claims {
            sub: account.id,
            email: account.email.clone(),
            exp: (Utc::now() + self.ttl).timestamp(),
            jti: Uuid::new_v4(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("token encoding failed: {e}")))?;
        let role = self.store.role_of(account.id).await?;

        info!(user_id = %account.id, role = ?role, "Signed in");
        Ok(Session {
            token,
            user_id: account.id,
            email: account.email,
            role,
            expires_at: claims.exp,
        })
    }

    /// Decodes a bearer token and rejects expired or revoked ones.
    pub async fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|_| AppError::Unauthorized)?;
        if self.revoked.read().await.contains_key(&data.claims.jti) {
            return Err(AppError::Unauthorized);
        }
        Ok(data.claims)
    }

    pub async fn sign_out(&self, claims: &Claims) {
        let now = Utc::now().timestamp();
        let mut revoked = self.revoked.write().await;
        revoked.retain(|_, exp| *exp > now);
        revoked.insert(claims.jti, claims.exp);
        info!(user_id = %claims.sub, "Signed out");
    }

    /// One-row profile lookup; `None` when the account has no profile.
    pub async fn role_of(&self, user_id: Uuid) -> Result<Option<Role>, AppError> {
        Ok(self.store.role_of(user_id).await?)
    }
}
