// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Secrets (JWT signing key, task token) are injected at startup and never
//! compiled into the binary.

use std::env;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Longest retention period accepted for discarded sessions (100 years).
pub const MAX_RETENTION_DAYS: i64 = 36_500;

/// Which storage backend the session repository runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Firestore,
    Memory,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Firestore => "firestore",
            StorageBackend::Memory => "memory",
        }
    }
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(StorageBackend::Firestore),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(ConfigError::Invalid("STORAGE_BACKEND")),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    pub storage_backend: StorageBackend,
    /// Path to the exercise catalog JSON file
    pub catalog_path: String,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    /// Discarded sessions older than this are hard-deleted
    pub retention_days: i64,
    /// Background retention sweep period; 0 disables the sweeper
    pub retention_sweep_interval_secs: u64,
    /// Body weight used for the calorie bracket when the caller supplies none
    pub default_body_weight_kg: f64,
    /// Outbound queue depth per realtime connection
    pub subscriber_buffer: usize,

    // --- Secrets ---
    /// JWT signing key for bearer tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Shared secret expected in `x-tasks-token` on `/tasks/*`
    pub tasks_auth_token: String,
}

impl Config {
    /// Config for tests only.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            storage_backend: StorageBackend::Memory,
            catalog_path: "data/catalog.json".to_string(),
            access_token_ttl_minutes: 30,
            refresh_token_ttl_days: 7,
            retention_days: 30,
            retention_sweep_interval_secs: 0,
            default_body_weight_kg: 70.0,
            subscriber_buffer: 64,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            tasks_auth_token: "test_tasks_token".to_string(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: parse_or("PORT", 8080)?,
            storage_backend: match env::var("STORAGE_BACKEND") {
                Ok(raw) => raw.parse()?,
                Err(_) => StorageBackend::Firestore,
            },
            catalog_path: env::var("CATALOG_PATH")
                .unwrap_or_else(|_| "data/catalog.json".to_string()),
            access_token_ttl_minutes: parse_or("ACCESS_TOKEN_TTL_MINUTES", 30)?,
            refresh_token_ttl_days: parse_or("REFRESH_TOKEN_TTL_DAYS", 7)?,
            retention_days: parse_in_range("RETENTION_DAYS", 30, 0..=MAX_RETENTION_DAYS)?,
            retention_sweep_interval_secs: parse_or("RETENTION_SWEEP_INTERVAL_SECS", 3600)?,
            default_body_weight_kg: parse_or("DEFAULT_BODY_WEIGHT_KG", 70.0)?,
            subscriber_buffer: parse_or("SUBSCRIBER_BUFFER", 64)?,

            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            tasks_auth_token: env::var("TASKS_AUTH_TOKEN")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("TASKS_AUTH_TOKEN"))?,
        })
    }
}

/// Parse an optional variable, falling back to `default` when unset.
fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Parse an optional integer variable that must fall inside `range`.
fn parse_in_range(
    name: &'static str,
    default: i64,
    range: RangeInclusive<i64>,
) -> Result<i64, ConfigError> {
    let value = parse_or(name, default)?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::Invalid(name))
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        // Set required env vars for test
        env::set_var("JWT_SIGNING_KEY", "test_jwt_key_32_bytes_minimum!!");
        env::set_var("TASKS_AUTH_TOKEN", " tasks-secret ");
        env::set_var("STORAGE_BACKEND", "memory");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.tasks_auth_token, "tasks-secret");
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert_eq!(config.port, 8080);
        assert_eq!(config.retention_days, 30);
    }

    #[test]
    fn test_retention_days_bounded() {
        assert_eq!(parse_in_range("WT_TEST_UNSET_RETENTION", 30, 0..=10).unwrap(), 30);

        env::set_var("WT_TEST_HUGE_RETENTION", "200000000");
        assert!(matches!(
            parse_in_range("WT_TEST_HUGE_RETENTION", 30, 0..=MAX_RETENTION_DAYS),
            Err(ConfigError::Invalid("WT_TEST_HUGE_RETENTION"))
        ));

        env::set_var("WT_TEST_NEGATIVE_RETENTION", "-1");
        assert!(parse_in_range("WT_TEST_NEGATIVE_RETENTION", 30, 0..=MAX_RETENTION_DAYS).is_err());
    }

    #[test]
    fn test_storage_backend_parse() {
        assert_eq!(
            "Firestore".parse::<StorageBackend>().unwrap(),
            StorageBackend::Firestore
        );
        assert!("postgres".parse::<StorageBackend>().is_err());
    }
}
