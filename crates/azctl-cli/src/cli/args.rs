use crate::cli::{commands::Commands, handlers};
use crate::config::CliConfig;
use crate::error::Result;
use clap::Parser;
use clap_verbosity_flag::{OffLevel, Verbosity};
use std::path::PathBuf;

/// azctl - Azure account and credential management
#[derive(Parser, Debug)]
#[command(
    name = "azctl",
    version,
    about = "azctl - Azure account and credential management",
    long_about = "Command-line front end for signing in to Azure and managing the\nsubscriptions visible to your accounts.

QUICK START:
  azctl login                        # Interactive device-code sign-in
  azctl account list                 # List your subscriptions
  azctl account set -s <id>          # Pick the active subscription
  azctl account get-access-token     # Mint a bearer token
  azctl logout                       # Sign out

SERVICE PRINCIPALS:
  azctl login --service-principal -u <app-id> -p <secret> --tenant <tenant>
  azctl login --service-principal -u <app-id> --certificate cert.pem --tenant <tenant>

MANAGED IDENTITY:
  azctl login --identity"
)]
pub struct Args {
    /// Configuration directory (defaults to the platform config dir or
    /// AZCTL_CONFIG_DIR)
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Output as JSON where a table would be printed
    #[arg(long, global = true)]
    pub json: bool,

    #[command(flatten)]
    pub verbosity: Verbosity<OffLevel>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Args {
    /// Execute the CLI command
    pub async fn run(self) -> Result<()> {
        let config_dir = match &self.config_dir {
            Some(dir) => expand_tilde(dir),
            None => azctl_common::config_dir()?,
        };
        let config = CliConfig::load(&config_dir).await?;

        match self.command {
            Commands::Login { options } => {
                handlers::auth::handle_login(options, &config_dir, config, self.json).await
            }
            Commands::Logout { username, all } => {
                handlers::auth::handle_logout(username, all, &config_dir, &config).await
            }
            Commands::Account { action } => {
                handlers::account::handle_account(action, &config_dir, &config, self.json).await
            }
        }
    }
}

/// Expand tilde (~) in file paths to the home directory
fn expand_tilde(path: &PathBuf) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(shellexpand::tilde(s).as_ref()),
        None => path.clone(),
    }
}
