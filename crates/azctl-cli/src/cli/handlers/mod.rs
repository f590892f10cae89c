//! Command handlers

pub mod account;
pub mod auth;

use crate::config::CliConfig;
use crate::error::Result;
use azctl_sdk::Profile;
use std::path::Path;

/// Open the profile the way every handler needs it: configured cloud,
/// persistence mode, compat switches, and client-id override applied.
pub(crate) async fn open_profile(
    config_dir: &Path,
    config: &CliConfig,
    cloud_override: Option<&str>,
) -> Result<Profile> {
    let cloud = config.resolve_cloud(cloud_override)?;
    let mut profile = Profile::load(config_dir, cloud, config.persist_mode())
        .await
        .with_compat(config.compat_options());
    if let Some(client_id) = &config.auth.client_id {
        profile = profile.with_client_id(client_id.clone());
    }
    Ok(profile)
}
