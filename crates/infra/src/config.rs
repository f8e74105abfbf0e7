//! Configuration loading and representation.
//!
//! Loaded once at startup into an immutable [`AppConfig`] and shared by `Arc`.

use std::net::SocketAddr;
use std::str::FromStr;

use chrono::Duration;
use thiserror::Error;
use tracing::warn;

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("{0} must be set when APP_ENV=production")]
    Required(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Clone, PartialEq, Eq)]
pub struct JwtConfig {
    pub secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl core::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AdminSeed {
    pub username: String,
    pub password: String,
}

impl core::fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AdminSeed")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SeedConfig {
    pub on_start: bool,
    pub admin: Option<AdminSeed>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub environment: Environment,
    pub server_addr: SocketAddr,
    /// `None` runs against the in-memory store.
    pub database: Option<DatabaseConfig>,
    pub jwt: JwtConfig,
    pub seed: SeedConfig,
}

impl AppConfig {
    /// Reads the process environment, after loading `.env` when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let environment = match get("APP_ENV").as_deref() {
            None | Some("development") | Some("dev") | Some("test") => Environment::Development,
            Some("production") | Some("prod") => Environment::Production,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "APP_ENV",
                    value: other.to_string(),
                });
            }
        };

        let server_addr = parse_or(&get, "SERVER_ADDR", "0.0.0.0:4000".parse::<SocketAddr>())?;

        let database = match get("DATABASE_URL") {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: parse_or(&get, "DB_MAX_CONNECTIONS", Ok::<u32, ()>(10))?,
            }),
            None => {
                if environment.is_production() {
                    return Err(ConfigError::Required("DATABASE_URL"));
                }
                None
            }
        };

        let secret = match get("JWT_SECRET") {
            Some(s) => s,
            None if environment.is_production() => return Err(ConfigError::Required("JWT_SECRET")),
            None => {
                warn!("JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
        };
        let access_minutes: i64 = parse_or(&get, "JWT_ACCESS_EXP", Ok::<i64, ()>(15))?;
        let refresh_minutes: i64 = parse_or(&get, "JWT_REFRESH_EXP", Ok::<i64, ()>(10080))?;
        if access_minutes <= 0 {
            return Err(ConfigError::Invalid {
                key: "JWT_ACCESS_EXP",
                value: access_minutes.to_string(),
            });
        }
        if refresh_minutes <= 0 {
            return Err(ConfigError::Invalid {
                key: "JWT_REFRESH_EXP",
                value: refresh_minutes.to_string(),
            });
        }

        let on_start = match get("SEED_ON_START").as_deref() {
            None => false,
            Some("1" | "true" | "TRUE" | "yes" | "on") => true,
            Some("0" | "false" | "FALSE" | "no" | "off") => false,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "SEED_ON_START",
                    value: other.to_string(),
                });
            }
        };
        let admin = match (get("SEED_ADMIN_USERNAME"), get("SEED_ADMIN_PASSWORD")) {
            (Some(username), Some(password)) => Some(AdminSeed { username, password }),
            (Some(_), None) => {
                warn!("SEED_ADMIN_USERNAME set without SEED_ADMIN_PASSWORD; admin user will not be seeded");
                None
            }
            _ => None,
        };

        Ok(Self {
            environment,
            server_addr,
            database,
            jwt: JwtConfig {
                secret,
                access_ttl: Duration::minutes(access_minutes),
                refresh_ttl: Duration::minutes(refresh_minutes),
            },
            seed: SeedConfig { on_start, admin },
        })
    }
}

/// Parses `key` when set, otherwise falls back to `default`.
fn parse_or<T: FromStr, E>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Result<T, E>,
) -> Result<T, ConfigError> {
    match get(key) {
        Some(raw) => raw.parse::<T>().map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => default.map_err(|_| ConfigError::Invalid {
            key,
            value: String::new(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_without_any_variables() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.environment, Environment::Development);
        assert_eq!(cfg.server_addr.port(), 4000);
        assert!(cfg.database.is_none());
        assert_eq!(cfg.jwt.access_ttl, Duration::minutes(15));
        assert_eq!(cfg.jwt.refresh_ttl, Duration::minutes(10080));
        assert!(!cfg.seed.on_start);
    }

    #[test]
    fn production_requires_secret_and_database() {
        assert_eq!(
            load(&[("APP_ENV", "production"), ("JWT_SECRET", "s")]),
            Err(ConfigError::Required("DATABASE_URL"))
        );
        assert_eq!(
            load(&[("APP_ENV", "production"), ("DATABASE_URL", "postgres://x")]),
            Err(ConfigError::Required("JWT_SECRET"))
        );
    }

    #[test]
    fn bad_number_is_a_config_error() {
        let err = load(&[("JWT_ACCESS_EXP", "soon")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "JWT_ACCESS_EXP", .. }));
    }

    #[test]
    fn admin_seed_needs_both_fields() {
        let cfg = load(&[("SEED_ADMIN_USERNAME", "admin")]).unwrap();
        assert!(cfg.seed.admin.is_none());

        let cfg = load(&[
            ("SEED_ADMIN_USERNAME", "admin"),
            ("SEED_ADMIN_PASSWORD", "admin123"),
            ("SEED_ON_START", "true"),
        ])
        .unwrap();
        assert!(cfg.seed.on_start);
        assert_eq!(cfg.seed.admin.unwrap().username, "admin");
    }

    #[test]
    fn secret_is_redacted_in_debug() {
        let cfg = load(&[("JWT_SECRET", "super-secret")]).unwrap();
        assert!(!format!("{cfg:?}").contains("super-secret"));
    }
}
