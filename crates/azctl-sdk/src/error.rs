//! Error taxonomy for the authentication subsystem
//!
//! Every variant that can reach a user carries actionable next steps, not a
//! raw transport error. Low-level reqwest/io failures are translated at the
//! boundary where they occur.

use thiserror::Error;

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Authentication subsystem errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// DNS/TLS/timeout class failures, surfaced with a remediation hint and
    /// never retried automatically outside the bounded managed-identity
    /// fetch and the connectivity pre-check.
    #[error("{message}. {hint}")]
    Connectivity { message: String, hint: String },

    /// Failures reported by the identity service. `code` is the AADSTS
    /// error code when one could be extracted from the response body.
    #[error("{}", format_authentication(.code, .message, .guidance))]
    Authentication {
        code: Option<String>,
        message: String,
        guidance: String,
    },

    /// Malformed input or state, raised immediately and never swallowed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Lookup misses with the identifier echoed back.
    #[error("{kind} '{identifier}' was not found")]
    NotFound {
        kind: &'static str,
        identifier: String,
    },

    /// No account is signed in.
    #[error("No account is signed in. Please run `azctl login`.")]
    NotLoggedIn,

    /// The identity can see a tenant but no subscription in it.
    #[error("No subscriptions were found for '{0}'. If this identity only has tenant-level access, re-run login with --allow-no-subscriptions.")]
    NoSubscriptions(String),

    /// Failure to persist credential or profile state. Fatal: credentials
    /// must never be lost silently.
    #[error("Failed to persist credential state: {0}")]
    Storage(String),

    /// A response from an external service that could not be understood.
    #[error("Unexpected response from service: {0}")]
    InvalidResponse(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

fn format_authentication(code: &Option<String>, message: &str, guidance: &str) -> String {
    match code {
        Some(code) => format!("Authentication failed ({code}): {message}. {guidance}"),
        None => format!("Authentication failed: {message}. {guidance}"),
    }
}

impl AuthError {
    /// Connectivity error with the standard remediation hint.
    pub fn connectivity(message: impl Into<String>) -> Self {
        AuthError::Connectivity {
            message: message.into(),
            hint: "Please check your network connection and proxy settings, then retry"
                .to_string(),
        }
    }

    /// Authentication error with no classified code and generic guidance.
    pub fn authentication(message: impl Into<String>) -> Self {
        AuthError::Authentication {
            code: None,
            message: message.into(),
            guidance: "Please run `azctl login` to re-authenticate".to_string(),
        }
    }

    /// Translate a transport-level reqwest error.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            AuthError::connectivity(err.to_string())
        } else {
            AuthError::InvalidResponse(err.to_string())
        }
    }
}
