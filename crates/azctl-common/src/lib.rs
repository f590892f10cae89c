//! Shared building blocks for the azctl crates: cloud endpoint definitions,
//! compiled-in identity constants, environment flags, configuration-directory
//! resolution, and logging setup.

pub mod clouds;
pub mod constants;
pub mod env;
pub mod logging;
pub mod paths;

pub use clouds::Cloud;
pub use constants::{ARM_API_VERSION, CLI_CLIENT_ID};
pub use paths::{config_dir, ConfigDirError};
