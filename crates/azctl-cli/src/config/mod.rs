//! Configuration management for the azctl CLI
//!
//! `config.toml` in the configuration directory holds the selected cloud,
//! optional identity overrides, and compatibility switches. A missing file
//! means defaults; the file is only written when the user changes
//! something (e.g. picks a cloud at login).

use crate::error::{CliError, Result};
use azctl_common::clouds::Cloud;
use azctl_sdk::{CompatOptions, PersistMode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

const CONFIG_FILE: &str = "config.toml";

/// CLI configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CliConfig {
    /// Cloud selection
    #[serde(default)]
    pub cloud: CloudSection,

    /// Identity and credential-cache tuning
    #[serde(default)]
    pub auth: AuthSection,

    /// Compatibility shims for older SDK behaviors
    #[serde(default)]
    pub compat: CompatSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudSection {
    /// Registered cloud name, e.g. `AzureCloud`.
    pub name: String,
}

impl Default for CloudSection {
    fn default() -> Self {
        Self {
            name: Cloud::azure_public().name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthSection {
    /// Client id override for token acquisition; the first-party CLI id is
    /// used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Port of the local managed-identity endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msi_port: Option<u16>,

    /// Flush the credential cache in the background instead of blocking
    /// each command on the write.
    #[serde(default)]
    pub async_persist: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CompatSection {
    /// Re-enable the historical behavior of dropping the first scope when
    /// several are requested. Off by default.
    #[serde(default)]
    pub drop_first_scope: bool,
}

impl CliConfig {
    /// Load configuration from the given configuration directory, falling
    /// back to defaults when no file exists.
    pub async fn load(config_dir: &Path) -> Result<Self> {
        Self::load_from_path(&config_dir.join(CONFIG_FILE)).await
    }

    pub async fn load_from_path(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());

        if !path.exists() {
            debug!("Configuration file not found, using defaults");
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        toml::from_str(&content)
            .map_err(|e| CliError::internal(format!("Failed to parse config: {e}")))
    }

    pub async fn save(&self, config_dir: &Path) -> Result<()> {
        self.save_to_path(&config_dir.join(CONFIG_FILE)).await
    }

    pub async fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| CliError::internal(format!("Failed to serialize config: {e}")))?;
        tokio::fs::write(path, content).await?;

        debug!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Resolve the configured cloud, rejecting unknown names with the list
    /// of valid ones.
    pub fn resolve_cloud(&self, override_name: Option<&str>) -> Result<Cloud> {
        let name = override_name.unwrap_or(&self.cloud.name);
        Cloud::by_name(name).ok_or_else(|| {
            let known = Cloud::known()
                .into_iter()
                .map(|c| c.name)
                .collect::<Vec<_>>()
                .join(", ");
            CliError::invalid_argument(format!("unknown cloud '{name}'"))
                .with_suggestion(format!("Valid clouds are: {known}"))
        })
    }

    pub fn compat_options(&self) -> CompatOptions {
        CompatOptions {
            drop_first_scope: self.compat.drop_first_scope,
        }
    }

    pub fn persist_mode(&self) -> PersistMode {
        if self.auth.async_persist {
            PersistMode::Deferred
        } else {
            PersistMode::Sync
        }
    }
}
