use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[serde(alias = "administrator")]
    Admin,
    #[serde(alias = "venditore")]
    Seller,
    #[serde(alias = "addetto_checkin")]
    CheckinStaff,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Seller, Role::CheckinStaff];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Seller => "seller",
            Role::CheckinStaff => "checkin_staff",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role {0:?}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    // Legacy Italian labels are still accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" | "administrator" => Ok(Role::Admin),
            "seller" | "venditore" => Ok(Role::Seller),
            "checkin_staff" | "addetto_checkin" => Ok(Role::CheckinStaff),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

/// Account row from the auth table; `user_profiles.id` points here.
#[derive(Debug, Clone, FromRow)]
pub struct AuthAccount {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
}

impl AuthAccount {
    pub fn verify_password(&self, password: &str) -> bool {
        bcrypt::verify(password, &self.password_hash).unwrap_or(false)
    }
}
