//! Error handling for the registry client and CLI.

use thiserror::Error;

/// A single error kind covering every protocol-level failure the registry
/// client can produce. Network failures are always retryable at the
/// caller's discretion but are never retried here beyond the one built-in
/// bearer-token refresh; a second 401 surfaces as `Unauthorized`.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Transport-level failure, wrapping the underlying `reqwest` error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A request came back 401 after the one bearer-token acquisition retry.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A response outside the status codes the calling operation recognizes.
    #[error("unexpected status during {phase}: {status} - {body}")]
    UnexpectedStatus {
        phase: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    /// Malformed JSON, a missing required key, or an unrecognized media type.
    #[error("decode error: {0}")]
    Decode(String),

    /// A precondition the caller controls was violated: mismatched object
    /// kinds, a digest-constrained destination that doesn't match the
    /// source, a malformed reference string, an invalid `--tag-pattern`.
    #[error("validation error: {0}")]
    Validation(String),

    /// Credential-file or CA-bundle I/O.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Decode(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for RegistryError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        RegistryError::Decode(format!("response body is not valid UTF-8: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
