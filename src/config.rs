use std::env;
use std::str::FromStr;

use thiserror::Error;

use crate::i18n::Language;

const DEV_JWT_SECRET: &str = "dev-secret-key-change-in-production";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Testing,
}

impl FromStr for Environment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            "testing" | "test" => Ok(Environment::Testing),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub environment: Environment,
    pub session_lifetime_secs: i64,
    pub cookie_secure: bool,
    pub default_language: Language,
    pub items_per_page: u32,
    pub low_stock_threshold: i32,
    pub password_min_length: usize,
    pub totp_issuer: String,
    pub static_dir: String,
}

impl AppConfig {
    /// Reads the process environment (after `.env` has been loaded).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = match get("APP_ENV") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid { key: "APP_ENV", value })?,
            None => Environment::Development,
        };
        let production = environment == Environment::Production;

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None if production => return Err(ConfigError::Missing("JWT_SECRET")),
            None => DEV_JWT_SECRET.to_string(),
        };

        let default_language = match get("DEFAULT_LANGUAGE") {
            Some(value) => Language::from_code(&value)
                .ok_or(ConfigError::Invalid { key: "DEFAULT_LANGUAGE", value })?,
            None => Language::En,
        };

        Ok(Self {
            database_url: get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10)?,
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, "PORT", 8000)?,
            jwt_secret,
            environment,
            session_lifetime_secs: parse_or(&get, "SESSION_LIFETIME_SECS", 1800)?,
            cookie_secure: parse_or(&get, "SESSION_COOKIE_SECURE", production)?,
            default_language,
            items_per_page: parse_or(&get, "ITEMS_PER_PAGE", 20)?,
            low_stock_threshold: parse_or(&get, "LOW_STOCK_THRESHOLD", 10)?,
            password_min_length: parse_or(&get, "PASSWORD_MIN_LENGTH", 12)?,
            totp_issuer: get("TOTP_ISSUER").unwrap_or_else(|| "IMS - Inventory Management".to_string()),
            static_dir: get("STATIC_DIR").unwrap_or_else(|| "static".to_string()),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value
            .trim()
            .to_ascii_lowercase()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn development_defaults() {
        let cfg = config(&[("DATABASE_URL", "postgres://localhost/ims")]).unwrap();
        assert_eq!(cfg.environment, Environment::Development);
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.items_per_page, 20);
        assert_eq!(cfg.low_stock_threshold, 10);
        assert_eq!(cfg.password_min_length, 12);
        assert_eq!(cfg.session_lifetime_secs, 1800);
        assert!(!cfg.cookie_secure);
        assert_eq!(cfg.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(cfg.bind_address(), "0.0.0.0:8000");
    }

    #[test]
    fn database_url_is_required() {
        assert!(matches!(config(&[]), Err(ConfigError::Missing("DATABASE_URL"))));
    }

    #[test]
    fn production_requires_secret_and_secures_cookies() {
        let missing = config(&[("DATABASE_URL", "postgres://db/ims"), ("APP_ENV", "production")]);
        assert!(matches!(missing, Err(ConfigError::Missing("JWT_SECRET"))));

        let cfg = config(&[
            ("DATABASE_URL", "postgres://db/ims"),
            ("APP_ENV", "production"),
            ("JWT_SECRET", "s3cret"),
        ])
        .unwrap();
        assert!(cfg.is_production());
        assert!(cfg.cookie_secure);
    }

    #[test]
    fn rejects_bad_values() {
        let err = config(&[("DATABASE_URL", "postgres://db/ims"), ("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));

        let err = config(&[("DATABASE_URL", "postgres://db/ims"), ("DEFAULT_LANGUAGE", "fr")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "DEFAULT_LANGUAGE", .. }));
    }

    #[test]
    fn parses_overrides() {
        let cfg = config(&[
            ("DATABASE_URL", "postgres://db/ims"),
            ("PORT", "3000"),
            ("SESSION_COOKIE_SECURE", "True"),
            ("DEFAULT_LANGUAGE", "bg"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 3000);
        assert!(cfg.cookie_secure);
        assert_eq!(cfg.default_language, Language::Bg);
    }
}
