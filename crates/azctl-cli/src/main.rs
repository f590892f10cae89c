//! Main entry point for the azctl CLI

use azctl_cli::cli::Args;
use clap::{CommandFactory, Parser};
use clap_complete::env::CompleteEnv;
use color_eyre::eyre::{eyre, Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Handle shell completions first (must be before argument parsing)
    CompleteEnv::with_factory(Args::command).complete();

    // Parse args
    let args = Args::parse();

    // Configure color-eyre without location/env sections; users get the
    // message and suggestion, not a stack trace.
    color_eyre::config::HookBuilder::default()
        .display_location_section(false)
        .display_env_section(false)
        .install()?;

    // Logging stays off for normal use; -v flags or RUST_LOG enable it.
    let binary_name = env!("CARGO_BIN_NAME").replace('-', "_");
    let default_filter = format!("{}=error", binary_name);
    azctl_common::logging::init_cli_logging(&args.verbosity, &default_filter)
        .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

    // Run and propagate errors as eyre::Report
    Ok(args.run().await?)
}
