//! Unified logging initialization for azctl binaries
//!
//! Filter priority, highest first:
//! 1. CLI flags (`-v/-q`)
//! 2. `RUST_LOG`
//! 3. The binary-specific default filter

use anyhow::Result;
use clap_verbosity_flag::{LogLevel, Verbosity};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging with the given verbosity flags and default filter.
pub fn init_logging<L: LogLevel>(verbosity: &Verbosity<L>, default_filter: &str) -> Result<()> {
    let filter = if let Some(log_level) = verbosity.log_level() {
        // CLI flags take priority
        EnvFilter::try_new(format!("{}", log_level))?
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();

    Ok(())
}

/// Initialize logging for the user-facing CLI binary.
///
/// The CLI stays silent unless verbosity flags were given or `RUST_LOG` is
/// set; command output goes to stdout, not the log.
///
/// Returns `true` if a subscriber was installed.
pub fn init_cli_logging<L: LogLevel>(
    verbosity: &Verbosity<L>,
    default_filter: &str,
) -> Result<bool> {
    if verbosity.log_level().is_some() || std::env::var("RUST_LOG").is_ok() {
        init_logging(verbosity, default_filter)?;
        Ok(true)
    } else {
        Ok(false)
    }
}
