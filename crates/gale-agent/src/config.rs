//! Configuration management for the Gale agent

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(String),

    #[error("Invalid configuration value: {0}")]
    Invalid(String),
}

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Agent identification
    pub agent_id: String,
    pub hostname: String,

    /// Server connection settings
    pub server_url: String,

    /// Root of the agent sandbox. Per-job working trees live under
    /// `<working_dir>/pipelines/<pipeline>`; no resolved working directory
    /// may escape this root.
    pub working_dir: PathBuf,

    /// Connection settings
    pub reconnect_initial_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub ping_interval_ms: u64,

    /// Console settings
    pub console_flush_interval_ms: u64,

    /// Logging settings
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent_id: "gale-agent".to_string(),
            hostname: "localhost".to_string(),
            server_url: "ws://localhost:8153/agent-channel".to_string(),
            working_dir: env::temp_dir().join("gale-agent"),
            reconnect_initial_delay_ms: 1000,
            reconnect_max_delay_ms: 60000,
            ping_interval_ms: 10000,
            console_flush_interval_ms: 5000,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(hostname) = hostname::get() {
            config.hostname = hostname.to_string_lossy().to_string();
            config.agent_id = config.hostname.clone();
        }
        if let Ok(agent_id) = env::var("GALE_AGENT_ID") {
            config.agent_id = agent_id;
        }

        // Server URL (required)
        config.server_url = env::var("GALE_SERVER_URL")
            .map_err(|_| ConfigError::Missing("GALE_SERVER_URL".to_string()))?;

        if let Ok(dir) = env::var("GALE_WORKING_DIR") {
            config.working_dir = PathBuf::from(dir);
        }

        // Connection settings
        if let Ok(delay) = env::var("GALE_RECONNECT_INITIAL_DELAY_MS") {
            config.reconnect_initial_delay_ms = delay
                .parse()
                .map_err(|_| ConfigError::Invalid("GALE_RECONNECT_INITIAL_DELAY_MS".to_string()))?;
        }
        if let Ok(delay) = env::var("GALE_RECONNECT_MAX_DELAY_MS") {
            config.reconnect_max_delay_ms = delay
                .parse()
                .map_err(|_| ConfigError::Invalid("GALE_RECONNECT_MAX_DELAY_MS".to_string()))?;
        }
        if let Ok(interval) = env::var("GALE_PING_INTERVAL_MS") {
            config.ping_interval_ms = interval
                .parse()
                .map_err(|_| ConfigError::Invalid("GALE_PING_INTERVAL_MS".to_string()))?;
        }

        // Console settings
        if let Ok(interval) = env::var("GALE_CONSOLE_FLUSH_INTERVAL_MS") {
            config.console_flush_interval_ms = interval
                .parse()
                .map_err(|_| ConfigError::Invalid("GALE_CONSOLE_FLUSH_INTERVAL_MS".to_string()))?;
        }

        if let Ok(level) = env::var("GALE_LOG_LEVEL") {
            config.log_level = level;
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_url.is_empty() {
            return Err(ConfigError::Invalid(
                "server_url cannot be empty".to_string(),
            ));
        }

        if !self.working_dir.is_absolute() {
            return Err(ConfigError::Invalid(
                "working_dir must be an absolute path".to_string(),
            ));
        }

        if self.console_flush_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "console_flush_interval_ms cannot be 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Directory holding per-job working trees.
    pub fn pipelines_dir(&self) -> PathBuf {
        self.working_dir.join("pipelines")
    }

    /// Working tree for one pipeline.
    pub fn pipeline_dir(&self, pipeline: &str) -> PathBuf {
        self.pipelines_dir().join(pipeline)
    }

    /// The sandbox root all resolved working directories must stay under.
    pub fn sandbox_root(&self) -> &Path {
        &self.working_dir
    }
}
