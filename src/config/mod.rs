use std::collections::HashMap;
use std::env;

use axum::http::HeaderName;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

/// Environment variable holding a JSON object of secrets, keyed like the
/// individual variables below.
pub const SECRETS_ENV: &str = "SECRETS_JSON";

pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse SECRETS_JSON: {0}")]
    Secrets(#[from] serde_json::Error),

    #[error("SECRETS_JSON must be a JSON object")]
    SecretsShape,

    #[error("{key} is required")]
    Missing { key: &'static str },

    #[error("{key} has an invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Full connection URL; when set it takes precedence over the fields below.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub ssl_mode: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub api_key_header: HeaderName,
    pub bootstrap_admin_key: Option<String>,
}

impl AuthConfig {
    pub fn new(api_key_header: HeaderName, bootstrap_admin_key: Option<String>) -> Self {
        Self {
            api_key_header,
            bootstrap_admin_key: bootstrap_admin_key.filter(|k| !k.is_empty()),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new(HeaderName::from_static("x-api-key"), None)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub environment: String,
    pub debug: bool,
    pub log_json: bool,
    pub cors_allowed_origins: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database: DatabaseConfig {
                url: None,
                host: "localhost".to_string(),
                port: 5432,
                user: "postgres".to_string(),
                password: "postgres".to_string(),
                name: "calendar".to_string(),
                ssl_mode: "disable".to_string(),
            },
            auth: AuthConfig::default(),
            environment: "development".to_string(),
            debug: false,
            log_json: false,
            cors_allowed_origins: None,
        }
    }
}

/// Resolves keys from the secrets blob first, then from the environment.
struct Sources<'a, F> {
    secrets: Option<HashMap<String, String>>,
    env: &'a F,
}

impl<F> Sources<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        self.secrets
            .as_ref()
            .and_then(|s| s.get(key).cloned())
            .or_else(|| (self.env)(key))
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: std::str::FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid { key, value }),
            None => Ok(default),
        }
    }
}

fn parse_secrets(raw: &str) -> Result<HashMap<String, String>, ConfigError> {
    let Value::Object(map) = serde_json::from_str::<Value>(raw)? else {
        return Err(ConfigError::SecretsShape);
    };

    Ok(map
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(s) => Some((key, s)),
            Value::Number(n) => Some((key, n.to_string())),
            Value::Bool(b) => Some((key, b.to_string())),
            _ => None,
        })
        .collect())
}

impl Config {
    /// Loads `.env` (if present), then `SECRETS_JSON`, then the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let secrets = env::var(SECRETS_ENV).ok().filter(|s| !s.trim().is_empty());
        Self::from_sources(secrets.as_deref(), &|key: &str| env::var(key).ok())
    }

    pub fn from_sources<F>(secrets: Option<&str>, env: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secrets = secrets.map(parse_secrets).transpose()?;
        let from_secrets = secrets.is_some();
        let sources = Sources { secrets, env };

        let defaults = Config::default();
        let default_ssl_mode = if from_secrets { "require" } else { "disable" };

        let header = sources.string("API_KEY_HEADER", DEFAULT_API_KEY_HEADER);
        let api_key_header = HeaderName::try_from(header.as_str()).map_err(|_| ConfigError::Invalid {
            key: "API_KEY_HEADER",
            value: header.clone(),
        })?;

        let config = Config {
            host: sources.string("HOST", &defaults.host),
            port: sources.parse("PORT", defaults.port)?,
            database: DatabaseConfig {
                url: sources.get("DATABASE_URL"),
                host: sources.string("DB_HOST", &defaults.database.host),
                port: sources.parse("DB_PORT", defaults.database.port)?,
                user: sources.string("DB_USER", &defaults.database.user),
                password: sources.string("DB_PASSWORD", &defaults.database.password),
                name: sources.string("DB_NAME", &defaults.database.name),
                ssl_mode: sources.string("DB_SSLMODE", default_ssl_mode),
            },
            auth: AuthConfig::new(api_key_header, sources.get("BOOTSTRAP_ADMIN_KEY")),
            environment: sources.string("ENVIRONMENT", &defaults.environment),
            debug: sources.parse("DEBUG", false)?,
            log_json: sources.get("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
            cors_allowed_origins: sources.get("CORS_ALLOWED_ORIGINS"),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.is_some() {
            return Ok(());
        }
        if self.database.host.trim().is_empty() {
            return Err(ConfigError::Missing { key: "DB_HOST" });
        }
        if self.database.user.trim().is_empty() {
            return Err(ConfigError::Missing { key: "DB_USER" });
        }
        if self.database.name.trim().is_empty() {
            return Err(ConfigError::Missing { key: "DB_NAME" });
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Logs the effective configuration without secrets.
    pub fn log_summary(&self) {
        info!(
            environment = %self.environment,
            host = %self.host,
            port = self.port,
            db_host = %self.database.host,
            db_name = %self.database.name,
            db_user = %self.database.user,
            db_sslmode = %self.database.ssl_mode,
            database_url_override = self.database.url.is_some(),
            debug = self.debug,
            api_key_header = %self.auth.api_key_header,
            "Application configuration"
        );

        match &self.auth.bootstrap_admin_key {
            Some(key) => info!(bootstrap_admin_key = %mask(key), "Bootstrap admin key configured"),
            None => warn!("No bootstrap admin key configured"),
        }
    }
}

/// Shows at most the first 8 characters of a secret.
pub fn mask(secret: &str) -> String {
    let prefix: String = secret.chars().take(8).collect();
    format!("{prefix}***")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_any_source() {
        let config = Config::from_sources(None, &env_from(&[])).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.database.name, "calendar");
        assert_eq!(config.database.ssl_mode, "disable");
        assert_eq!(config.auth.api_key_header.as_str(), "x-api-key");
        assert!(config.auth.bootstrap_admin_key.is_none());
    }

    #[test]
    fn test_environment_variables_override_defaults() {
        let env = env_from(&[
            ("PORT", "9090"),
            ("DB_HOST", "db.internal"),
            ("API_KEY_HEADER", "X-Calendar-Key"),
            ("BOOTSTRAP_ADMIN_KEY", "bootstrap-secret"),
            ("DEBUG", "true"),
        ]);
        let config = Config::from_sources(None, &env).unwrap();

        assert_eq!(config.port, 9090);
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.auth.api_key_header.as_str(), "x-calendar-key");
        assert_eq!(config.auth.bootstrap_admin_key.as_deref(), Some("bootstrap-secret"));
        assert!(config.debug);
    }

    #[test]
    fn test_secrets_take_precedence_and_require_tls() {
        let env = env_from(&[("DB_HOST", "from-env"), ("DB_NAME", "env-db")]);
        let secrets = r#"{"DB_HOST": "from-secrets", "DB_PORT": 6432}"#;
        let config = Config::from_sources(Some(secrets), &env).unwrap();

        assert_eq!(config.database.host, "from-secrets");
        assert_eq!(config.database.port, 6432);
        assert_eq!(config.database.name, "env-db");
        assert_eq!(config.database.ssl_mode, "require");
    }

    #[test]
    fn test_malformed_secrets_are_rejected() {
        assert!(matches!(
            Config::from_sources(Some("not json"), &env_from(&[])),
            Err(ConfigError::Secrets(_))
        ));
        assert!(matches!(
            Config::from_sources(Some("[1, 2]"), &env_from(&[])),
            Err(ConfigError::SecretsShape)
        ));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            Config::from_sources(None, &env_from(&[("PORT", "eighty")])),
            Err(ConfigError::Invalid { key: "PORT", .. })
        ));
        assert!(matches!(
            Config::from_sources(None, &env_from(&[("API_KEY_HEADER", "bad header")])),
            Err(ConfigError::Invalid { key: "API_KEY_HEADER", .. })
        ));
    }

    #[test]
    fn test_mask_hides_secret_tail() {
        assert_eq!(mask("abcdefghijkl"), "abcdefgh***");
        assert_eq!(mask("abc"), "abc***");
    }
}
