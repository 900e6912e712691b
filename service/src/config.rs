use dslpipe::{DuplicatePolicy, FailureMode, RunOptions};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Service settings, read from `DSLPIPE_*` environment variables
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub addr: SocketAddr,
    pub data_dir: PathBuf,
    pub body_limit: usize,
    /// Defaults every run starts from before request overrides
    pub run_defaults: RunOptions,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            data_dir: PathBuf::from("./data"),
            body_limit: 64 * 1024 * 1024,
            run_defaults: RunOptions::default(),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup("DSLPIPE_ADDR") {
            config.addr = parse("DSLPIPE_ADDR", &value)?;
        }
        if let Some(value) = lookup("DSLPIPE_DATA_DIR") {
            config.data_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup("DSLPIPE_BODY_LIMIT") {
            config.body_limit = parse("DSLPIPE_BODY_LIMIT", &value)?;
        }
        if let Some(value) = lookup("DSLPIPE_PLUGIN_DIR") {
            config.run_defaults.search_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("DSLPIPE_DUPLICATES") {
            config.run_defaults.duplicates = match value.as_str() {
                "reject" => DuplicatePolicy::Reject,
                "last-wins" => DuplicatePolicy::LastWins,
                _ => return Err(invalid("DSLPIPE_DUPLICATES", value)),
            };
        }
        if let Some(value) = lookup("DSLPIPE_FAILURE_MODE") {
            config.run_defaults.failure_mode = match value.as_str() {
                "fail-fast" => FailureMode::FailFast,
                "isolate" => FailureMode::Isolate,
                _ => return Err(invalid("DSLPIPE_FAILURE_MODE", value)),
            };
        }

        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value.to_string()))
}

fn invalid(key: &'static str, value: String) -> ConfigError {
    ConfigError::Invalid { key, value }
}
