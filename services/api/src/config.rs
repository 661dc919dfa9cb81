//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use adaptive_tutor_core::config::{
    PipelineConfig, MAX_CACHE_TTL_HOURS, MAX_RATE_LIMIT_PER_MINUTE, MIN_CACHE_TTL_HOURS,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Absent means the service keeps everything in memory.
    pub database_url: Option<String>,
    /// Text files loaded as trainings when running without a database.
    pub materials_dir: Option<PathBuf>,
    pub log_level: Level,
    pub openai_api_key: Option<String>,
    pub generation_model: String,
    pub chat_model: String,
    pub enrichment_model: String,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server and Database Settings ---
        let bind_address = parse_or(&lookup, "BIND_ADDRESS", "0.0.0.0:3000".parse::<SocketAddr>().ok())?
            .ok_or_else(|| ConfigError::MissingVar("BIND_ADDRESS".to_string()))?;
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        let materials_dir = lookup("MATERIALS_DIR").map(PathBuf::from);

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- AI Backend ---
        let openai_api_key = lookup("OPENAI_API_KEY");
        let generation_model = lookup("GENERATION_MODEL").unwrap_or_else(|| "gpt-4o".to_string());
        let chat_model = lookup("CHAT_MODEL").unwrap_or_else(|| "gpt-4o".to_string());
        let enrichment_model = lookup("ENRICHMENT_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());

        // --- Pipeline Tuning ---
        let defaults = PipelineConfig::default();
        let cache_ttl_hours: u32 = parse_or(&lookup, "CACHE_TTL_HOURS", Some(defaults.cache_ttl_hours))?
            .unwrap_or(defaults.cache_ttl_hours);
        if !(MIN_CACHE_TTL_HOURS..=MAX_CACHE_TTL_HOURS).contains(&cache_ttl_hours) {
            return Err(ConfigError::InvalidValue(
                "CACHE_TTL_HOURS".to_string(),
                format!(
                    "{} is outside {}..={} hours",
                    cache_ttl_hours, MIN_CACHE_TTL_HOURS, MAX_CACHE_TTL_HOURS
                ),
            ));
        }

        let rate_limit_per_minute: u32 =
            parse_or(&lookup, "RATE_LIMIT_PER_MINUTE", Some(defaults.rate_limit_per_minute))?
                .unwrap_or(defaults.rate_limit_per_minute);
        if !(1..=MAX_RATE_LIMIT_PER_MINUTE).contains(&rate_limit_per_minute) {
            return Err(ConfigError::InvalidValue(
                "RATE_LIMIT_PER_MINUTE".to_string(),
                format!("{} is outside 1..={}", rate_limit_per_minute, MAX_RATE_LIMIT_PER_MINUTE),
            ));
        }

        let rate_limit_max_wait = seconds_or(&lookup, "RATE_LIMIT_MAX_WAIT_SECS", defaults.rate_limit_max_wait)?;
        let ai_call_timeout = seconds_or(&lookup, "AI_CALL_TIMEOUT_SECS", defaults.ai_call_timeout)?;
        let enrichment_array_cap = positive_or(&lookup, "ENRICHMENT_ARRAY_CAP", defaults.enrichment_array_cap)?;
        let enrichment_queue_capacity =
            positive_or(&lookup, "ENRICHMENT_QUEUE_CAPACITY", defaults.enrichment_queue_capacity)?;
        let chat_history_window = positive_or(&lookup, "CHAT_HISTORY_WINDOW", defaults.chat_history_window)?;

        Ok(Self {
            bind_address,
            database_url,
            materials_dir,
            log_level,
            openai_api_key,
            generation_model,
            chat_model,
            enrichment_model,
            pipeline: PipelineConfig {
                cache_ttl_hours,
                rate_limit_per_minute,
                rate_limit_max_wait,
                ai_call_timeout,
                enrichment_array_cap,
                enrichment_queue_capacity,
                chat_history_window,
                ..defaults
            },
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: Option<T>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

fn seconds_or<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs = parse_or::<u64, _>(lookup, key, Some(default.as_secs()))?.unwrap_or(default.as_secs());
    if secs == 0 {
        return Err(ConfigError::InvalidValue(key.to_string(), "must be at least 1 second".to_string()));
    }
    Ok(Duration::from_secs(secs))
}

fn positive_or<F>(lookup: &F, key: &str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or::<usize, _>(lookup, key, Some(default))?.unwrap_or(default);
    if value == 0 {
        return Err(ConfigError::InvalidValue(key.to_string(), "must be at least 1".to_string()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_address.port(), 3000);
        assert!(config.database_url.is_none());
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.pipeline, PipelineConfig::default());
    }

    #[test]
    fn pipeline_settings_are_read() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/tutor"),
            ("CACHE_TTL_HOURS", "24"),
            ("RATE_LIMIT_PER_MINUTE", "30"),
            ("AI_CALL_TIMEOUT_SECS", "45"),
            ("CHAT_HISTORY_WINDOW", "4"),
        ])
        .unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/tutor"));
        assert_eq!(config.pipeline.cache_ttl_hours, 24);
        assert_eq!(config.pipeline.rate_limit_per_minute, 30);
        assert_eq!(config.pipeline.ai_call_timeout, Duration::from_secs(45));
        assert_eq!(config.pipeline.chat_history_window, 4);
    }

    #[test]
    fn cache_ttl_outside_the_window_is_rejected() {
        let err = config_from(&[("CACHE_TTL_HOURS", "48")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(key, _) if key == "CACHE_TTL_HOURS"));
    }

    #[test]
    fn oversized_rate_budget_is_rejected() {
        let err = config_from(&[("RATE_LIMIT_PER_MINUTE", "4294967295")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(key, _) if key == "RATE_LIMIT_PER_MINUTE"));
        let config = config_from(&[("RATE_LIMIT_PER_MINUTE", "10000")]).unwrap();
        assert_eq!(config.pipeline.rate_limit_per_minute, MAX_RATE_LIMIT_PER_MINUTE);
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        assert!(config_from(&[("RATE_LIMIT_PER_MINUTE", "lots")]).is_err());
        assert!(config_from(&[("RATE_LIMIT_PER_MINUTE", "0")]).is_err());
        assert!(config_from(&[("BIND_ADDRESS", "nowhere")]).is_err());
        assert!(config_from(&[("RUST_LOG", "chatty")]).is_err());
    }
}
