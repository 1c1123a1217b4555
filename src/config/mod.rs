use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use thiserror::Error;

use crate::checkin::FacingMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

// Root configuration, one section per concern
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub checkin: CheckInConfig,
    pub features: FeatureFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expires_in_hours: i64,
}

// Hints handed to the camera widget on the check-in screen
#[derive(Debug, Clone, Deserialize)]
pub struct CheckInConfig {
    pub facing_mode: FacingMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureFlags {
    /// When off, roles are display-only and every signed-in user may mutate.
    pub enable_role_guards: bool,
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        (self.0)(name)
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing(name))
    }

    fn or(&self, name: &str, default: &str) -> String {
        (self.0)(name).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T: std::str::FromStr>(
        &self,
        name: &'static str,
        default: &str,
    ) -> Result<T, ConfigError> {
        let value = self.or(name, default);
        value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value })
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|name| vars.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars(lookup);

        let log_format = match vars.or("LOG_FORMAT", "pretty").as_str() {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            other => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    value: other.to_string(),
                })
            }
        };

        let facing_mode = match vars.or("CHECKIN_FACING_MODE", "environment").as_str() {
            "environment" => FacingMode::Environment,
            "user" => FacingMode::User,
            other => {
                return Err(ConfigError::Invalid {
                    name: "CHECKIN_FACING_MODE",
                    value: other.to_string(),
                })
            }
        };

        Ok(Config {
            app: AppConfig {
                host: vars.or("HOST", "0.0.0.0"),
                port: vars.parsed("PORT", "8000")?,
                environment: vars.or("ENVIRONMENT", "development"),
                rust_log: vars.or("RUST_LOG", "theater_booking=debug,tower_http=debug"),
                log_format,
            },
            database: DatabaseConfig {
                url: vars.required("DATABASE_URL")?,
                pool_size: vars.parsed("DB_POOL_SIZE", "10")?,
                acquire_timeout_secs: vars.parsed("DB_ACQUIRE_TIMEOUT_SECS", "5")?,
            },
            jwt: JwtConfig {
                secret: vars.required("JWT_SECRET")?,
                expires_in_hours: vars.parsed("JWT_EXPIRES_IN_HOURS", "12")?,
            },
            checkin: CheckInConfig { facing_mode },
            features: FeatureFlags {
                enable_role_guards: vars.parsed("ENABLE_ROLE_GUARDS", "true")?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_fill_everything_but_secrets() {
        let config = Config::from_map(&vars(&[
            ("DATABASE_URL", "postgres://localhost/theater"),
            ("JWT_SECRET", "s3cret"),
        ]))
        .unwrap();

        assert_eq!(config.app.port, 8000);
        assert_eq!(config.app.log_format, LogFormat::Pretty);
        assert_eq!(config.database.pool_size, 10);
        assert_eq!(config.jwt.expires_in_hours, 12);
        assert_eq!(config.checkin.facing_mode, FacingMode::Environment);
        assert!(config.features.enable_role_guards);
    }

    #[test]
    fn missing_database_url_is_reported() {
        let err = Config::from_map(&vars(&[("JWT_SECRET", "x")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn bad_numbers_and_flags_are_rejected() {
        let base = [("DATABASE_URL", "postgres://x"), ("JWT_SECRET", "x")];

        let mut with_port = vars(&base);
        with_port.insert("PORT".into(), "eighty".into());
        assert!(matches!(
            Config::from_map(&with_port),
            Err(ConfigError::Invalid { name: "PORT", .. })
        ));

        let mut with_flag = vars(&base);
        with_flag.insert("ENABLE_ROLE_GUARDS".into(), "sometimes".into());
        assert!(Config::from_map(&with_flag).is_err());

        let mut with_format = vars(&base);
        with_format.insert("LOG_FORMAT".into(), "xml".into());
        assert!(Config::from_map(&with_format).is_err());
    }
}
