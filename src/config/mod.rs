// src/config/mod.rs
// Runtime configuration, loaded from the environment (and .env when present)

use std::str::FromStr;
use std::time::Duration;

use once_cell::sync::Lazy;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct TallyConfig {
    // ── Database
    pub database_url: String,
    pub max_connections: u32,
    pub busy_timeout_secs: u64,

    // ── Squasher
    pub squash_enabled: bool,
    pub squash_interval_secs: u64,
    pub squash_batch: usize,

    // ── Logging
    pub log_level: String,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:./tally.db".to_string(),
            max_connections: 5,
            busy_timeout_secs: 10,
            squash_enabled: true,
            squash_interval_secs: 60,
            squash_batch: 5000,
            log_level: "info".to_string(),
        }
    }
}

/// Strips trailing `# comments` and whitespace, then parses.
fn parse_value<T: FromStr>(raw: &str) -> Option<T> {
    raw.split('#').next().unwrap_or("").trim().parse::<T>().ok()
}

fn env_var_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(val) => match parse_value(&val) {
            Some(parsed) => parsed,
            None => {
                // logging isn't up yet when config loads
                eprintln!("Config: {key} = '{val}' (parse failed, using default)");
                default
            }
        },
        Err(_) => default,
    }
}

/// Like `parse_value` for URLs and paths, where `#` may be part of the value:
/// only a `#` preceded by whitespace starts a comment.
fn url_value(raw: &str) -> Option<String> {
    let value = raw
        .find(" #")
        .or_else(|| raw.find("\t#"))
        .map_or(raw, |i| &raw[..i])
        .trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn env_url_or(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .and_then(|val| url_value(&val))
        .unwrap_or(default)
}

impl TallyConfig {
    pub fn from_env() -> Self {
        // a missing .env is fine; plain environment variables still apply
        let _ = dotenvy::dotenv();

        let defaults = Self::default();
        Self {
            database_url: env_url_or("DATABASE_URL", defaults.database_url),
            max_connections: env_var_or("TALLY_MAX_CONNECTIONS", defaults.max_connections),
            busy_timeout_secs: env_var_or("TALLY_BUSY_TIMEOUT_SECS", defaults.busy_timeout_secs),
            squash_enabled: env_var_or("TALLY_SQUASH_ENABLED", defaults.squash_enabled),
            squash_interval_secs: env_var_or("TALLY_SQUASH_INTERVAL", defaults.squash_interval_secs),
            squash_batch: env_var_or("TALLY_SQUASH_BATCH", defaults.squash_batch),
            log_level: env_var_or("TALLY_LOG_LEVEL", defaults.log_level),
        }
    }

    pub fn squash_interval(&self) -> Duration {
        Duration::from_secs(self.squash_interval_secs.max(1))
    }

    /// Max tracing level, falling back to INFO for unknown names.
    pub fn tracing_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}

pub static CONFIG: Lazy<TallyConfig> = Lazy::new(TallyConfig::from_env);
