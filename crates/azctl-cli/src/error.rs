//! Error types for the azctl CLI

use thiserror::Error;

/// CLI error type with minimal variants
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration directory resolution failed
    #[error("Configuration error: {0}")]
    Config(#[from] azctl_common::ConfigDirError),

    /// Authentication/authorization issues
    #[error(transparent)]
    Auth(#[from] azctl_sdk::AuthError),

    /// Bad command-line input
    #[error("{0}")]
    InvalidArgument(String),

    /// Everything else
    #[error("{message}")]
    Internal { message: String },

    /// An error decorated with a next-step suggestion for the user
    #[error("{message}\n  Suggestion: {suggestion}")]
    WithSuggestion { message: String, suggestion: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl CliError {
    pub fn internal(message: impl Into<String>) -> Self {
        CliError::Internal {
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        CliError::InvalidArgument(message.into())
    }

    /// Attach a remediation suggestion, keeping the original message.
    pub fn with_suggestion(self, suggestion: impl Into<String>) -> Self {
        CliError::WithSuggestion {
            message: self.to_string(),
            suggestion: suggestion.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
