//! AMI client errors.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AmiError {
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Action {action} failed: {message}")]
    ActionFailed { action: String, message: String },
}

impl AmiError {
    /// Whether the failure came from the transport rather than from Asterisk
    /// refusing the request. Transient failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AmiError::Connect { .. } | AmiError::Io(_) | AmiError::Timeout(_)
        )
    }
}
