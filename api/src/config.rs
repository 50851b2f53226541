//! Process configuration, read once from the environment at startup.

use chrono::Duration;

pub const DEFAULT_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    /// Public base URL, used to build absolute pagination links.
    pub api_url: String,
    pub cors_origin: String,
    pub jwt_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub max_page_limit: i64,
    pub log_format: LogFormat,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a positive integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },
    #[error("LOG_FORMAT must be `pretty` or `json`, got {0:?}")]
    InvalidLogFormat(String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let number = |key: &'static str, default: i64| -> Result<i64, ConfigError> {
            match lookup(key) {
                None => Ok(default),
                Some(raw) => match raw.trim().parse::<i64>() {
                    Ok(n) if n > 0 => Ok(n),
                    _ => Err(ConfigError::InvalidNumber {
                        name: key,
                        value: raw,
                    }),
                },
            }
        };

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => return Err(ConfigError::InvalidLogFormat(other.to_string())),
        };

        Ok(Self {
            database_url: text("DATABASE_URL", "yatube.db"),
            bind_addr: text("BIND_ADDR", "0.0.0.0:8080"),
            api_url: text("API_URL", "http://localhost:8080")
                .trim_end_matches('/')
                .to_string(),
            cors_origin: text("CORS_ORIGIN", "*"),
            jwt_secret: text("JWT_SECRET", DEFAULT_JWT_SECRET),
            access_token_ttl: Duration::minutes(number("ACCESS_TOKEN_TTL_MINUTES", 24 * 60)?),
            refresh_token_ttl: Duration::days(number("REFRESH_TOKEN_TTL_DAYS", 30)?),
            max_page_limit: number("MAX_PAGE_LIMIT", 100)?,
            log_format,
        })
    }
}
