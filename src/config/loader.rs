//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};
use crate::handlers::BUILTIN_KINDS;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file, accepting the
/// built-in handler kinds.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    load_config_with_kinds(path, BUILTIN_KINDS)
}

/// Load and validate configuration, accepting the given handler kinds.
pub fn load_config_with_kinds(path: &Path, known_kinds: &[&str]) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ProxyConfig = toml::from_str(&content)?;

    validate_config(&config, known_kinds).map_err(ConfigError::Validation)?;

    Ok(config)
}
