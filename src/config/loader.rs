//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::EngineConfig;
use crate::routing::pattern::{expand, Pattern};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),

    /// The file was not valid TOML for the schema.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),

    /// The file parsed but described an unusable setup.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: EngineConfig = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.listeners.is_empty() {
        return Err(ConfigError::Invalid("no listeners configured".into()));
    }

    for host in &config.hosts {
        match (&host.body, &host.file) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::Invalid(format!(
                    "host `{}` sets both body and file",
                    host.pattern
                )));
            }
            (None, None) => {
                return Err(ConfigError::Invalid(format!(
                    "host `{}` sets neither body nor file",
                    host.pattern
                )));
            }
            _ => {}
        }
        // Surface bad patterns at load time instead of at registration.
        let expanded = expand(&host.pattern)
            .map_err(|e| ConfigError::Invalid(format!("host `{}`: {e}", host.pattern)))?;
        for text in expanded {
            Pattern::parse(&text)
                .map_err(|e| ConfigError::Invalid(format!("host `{}`: {e}", host.pattern)))?;
        }
    }

    Ok(())
}
