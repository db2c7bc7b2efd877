use std::{fmt::Display, str::FromStr, time::Duration};

use dining_common::{gemini::GeminiClientConfig, openai::OpenAiClientConfig};

use crate::error::AppError;

const GOOGLE_DISTANCE_MATRIX_URL: &str =
    "https://maps.googleapis.com/maps/api/distancematrix/json";

/// Postgres connection settings. `url` wins over the discrete fields when set.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// `DB_SSL=true` requires TLS.
    pub ssl: bool,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

/// Application configuration, read once from the environment at startup.
///
/// Every credential is optional: the service starts without them and the
/// affected endpoints report a configuration error per request.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Public base URL the frontend uses to reach this service.
    pub api_base_url: Option<String>,
    pub database: DatabaseConfig,
    pub maps_api_key: Option<String>,
    pub distance_matrix_url: String,
    pub gemini: GeminiClientConfig,
    pub openai: OpenAiClientConfig,
    /// Optional shared tier for the menu cache.
    pub redis_url: Option<String>,
    pub menu_cache_ttl: Duration,
    pub max_body_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// - `PORT` (3001), `API_BASE_URL`
    /// - `DATABASE_URL`, or `DB_HOST`/`DB_PORT`/`DB_NAME`/`DB_USER`/`DB_PASSWORD`
    /// - `DB_SSL`, `DB_MAX_CONNECTIONS` (10), `DB_ACQUIRE_TIMEOUT_SECS` (5)
    /// - `GOOGLE_MAPS_KEY`, `DISTANCE_MATRIX_URL`
    /// - `GEMINI_*` and `OPENAI_*` (see the client configs)
    /// - `REDIS_URL`, `MENU_CACHE_TTL_SECS` (3600), `MAX_BODY_BYTES` (1000000)
    pub fn from_env() -> Result<Self, AppError> {
        let database = DatabaseConfig {
            url: env_opt("DATABASE_URL"),
            host: env_opt("DB_HOST").unwrap_or_else(|| "localhost".to_string()),
            port: parse_var("DB_PORT", env_opt("DB_PORT"), 5432)?,
            name: env_opt("DB_NAME").unwrap_or_else(|| "stanford_menu".to_string()),
            user: env_opt("DB_USER"),
            password: env_opt("DB_PASSWORD"),
            ssl: parse_flag(env_opt("DB_SSL")),
            max_connections: parse_var("DB_MAX_CONNECTIONS", env_opt("DB_MAX_CONNECTIONS"), 10)?,
            acquire_timeout: Duration::from_secs(parse_var(
                "DB_ACQUIRE_TIMEOUT_SECS",
                env_opt("DB_ACQUIRE_TIMEOUT_SECS"),
                5,
            )?),
        };

        Ok(Self {
            port: parse_var("PORT", env_opt("PORT"), 3001)?,
            api_base_url: env_opt("API_BASE_URL"),
            database,
            maps_api_key: env_opt("GOOGLE_MAPS_KEY"),
            distance_matrix_url: env_opt("DISTANCE_MATRIX_URL")
                .unwrap_or_else(|| GOOGLE_DISTANCE_MATRIX_URL.to_string()),
            gemini: GeminiClientConfig::from_env(),
            openai: OpenAiClientConfig::from_env(),
            redis_url: env_opt("REDIS_URL"),
            menu_cache_ttl: Duration::from_secs(parse_var(
                "MENU_CACHE_TTL_SECS",
                env_opt("MENU_CACHE_TTL_SECS"),
                3600,
            )?),
            max_body_bytes: parse_var("MAX_BODY_BYTES", env_opt("MAX_BODY_BYTES"), 1_000_000)?,
        })
    }
}

/// A set, non-blank environment variable.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T>(key: &str, raw: Option<String>, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| AppError::Config(format!("invalid {key} value {raw:?}: {e}"))),
    }
}

fn parse_flag(raw: Option<String>) -> bool {
    matches!(raw.as_deref(), Some(v) if v.eq_ignore_ascii_case("true") || v == "1")
}
