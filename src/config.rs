//! Configuration loader and validator for the push dispatch service.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub push: Push,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub cycle_interval_ms: u64,
    /// Maximum devices sent per notification per cycle.
    pub batch_per_cycle: usize,
    /// In-flight sends within one batch; 1 keeps delivery sequential.
    pub send_concurrency: usize,
}

/// Push gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Push {
    pub endpoint: String,
    pub api_key: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.cycle_interval_ms == 0 {
        return Err(ConfigError::Invalid("app.cycle_interval_ms must be > 0"));
    }
    if cfg.app.batch_per_cycle == 0 {
        return Err(ConfigError::Invalid("app.batch_per_cycle must be > 0"));
    }
    if cfg.app.send_concurrency == 0 {
        return Err(ConfigError::Invalid("app.send_concurrency must be > 0"));
    }

    if cfg.push.endpoint.trim().is_empty() {
        return Err(ConfigError::Invalid("push.endpoint must be non-empty"));
    }
    if cfg.push.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("push.api_key must be non-empty"));
    }

    Ok(())
}

/// Example configuration shipped with the repository.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  cycle_interval_ms: 60000
  batch_per_cycle: 100
  send_concurrency: 1

push:
  endpoint: "https://push.gateway.example/"
  api_key: "YOUR_PUSH_GATEWAY_API_KEY"
"#
}
