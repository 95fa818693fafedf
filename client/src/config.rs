//! Configuration for the sync client.

use std::env;
use std::time::Duration;

/// Client configuration, loadable from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite URL for the on-device database (e.g. "sqlite://reel.db")
    pub database_url: String,
    /// Base URL of the remote sync API
    pub sync_endpoint: String,
    /// Hard timeout for a single replay attempt
    pub attempt_timeout: Duration,
    /// Periodic wake interval for the replay agent
    pub replay_interval: Duration,
    /// How long an undo toast stays actionable
    pub undo_window: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://reel.db".to_string(),
            sync_endpoint: "http://localhost:3000/api/sync".to_string(),
            attempt_timeout: Duration::from_secs(10),
            replay_interval: Duration::from_secs(60),
            undo_window: Duration::from_secs(4),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let database_url = env::var("REEL_DATABASE_URL").unwrap_or(defaults.database_url);
        let sync_endpoint = env::var("REEL_SYNC_ENDPOINT").unwrap_or(defaults.sync_endpoint);

        let attempt_timeout = match env::var("REEL_ATTEMPT_TIMEOUT_MS") {
            Ok(raw) => Duration::from_millis(
                raw.parse()
                    .map_err(|_| ConfigError::InvalidDuration("REEL_ATTEMPT_TIMEOUT_MS"))?,
            ),
            Err(_) => defaults.attempt_timeout,
        };

        let replay_interval = match env::var("REEL_REPLAY_INTERVAL_MS") {
            Ok(raw) => Duration::from_millis(
                raw.parse()
                    .map_err(|_| ConfigError::InvalidDuration("REEL_REPLAY_INTERVAL_MS"))?,
            ),
            Err(_) => defaults.replay_interval,
        };

        Ok(Self {
            database_url,
            sync_endpoint,
            attempt_timeout,
            replay_interval,
            undo_window: defaults.undo_window,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be an integer millisecond value")]
    InvalidDuration(&'static str),
}
