//! Configuration-directory resolution
//!
//! All process-wide state (credential cache, subscription profile, CLI
//! config) lives under one directory: the `AZCTL_CONFIG_DIR` override if
//! set, else the platform config dir joined with `azctl`.

use crate::env::CONFIG_DIR_VAR;
use etcetera::{choose_base_strategy, BaseStrategy};
use std::path::PathBuf;
use thiserror::Error;

/// Failure to determine the configuration directory.
#[derive(Debug, Error)]
pub enum ConfigDirError {
    #[error("Failed to determine base directories: {0}")]
    BaseStrategy(String),
}

/// Resolve the azctl configuration directory.
pub fn config_dir() -> Result<PathBuf, ConfigDirError> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_VAR) {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }

    let strategy =
        choose_base_strategy().map_err(|e| ConfigDirError::BaseStrategy(e.to_string()))?;
    Ok(strategy.config_dir().join("azctl"))
}
