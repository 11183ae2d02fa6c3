//! Error types for the provisioning service.

use crate::registry::ProvisioningState;
use axum::extract::rejection::JsonRejection;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Provisioning error types.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("Account already exists: {0}")]
    Conflict(String),

    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("Account not found: {0}")]
    NotFound(String),

    #[error("Account {identifier} cannot move from {from} to {to}")]
    InvalidTransition {
        identifier: String,
        from: ProvisioningState,
        to: ProvisioningState,
    },

    #[error("Failed to write configuration for {identifier}: {message}")]
    Write { identifier: String, message: String },

    #[error("Account {identifier} is configured but not live: {message}")]
    Reload { identifier: String, message: String },

    #[error("Secret generation failed: {0}")]
    Generator(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Registration rate limit exceeded, retry in {}s", retry_after_secs(*retry_after))]
    RateLimitExceeded { retry_after: Duration },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProvisioningError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        ProvisioningError::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code for the error.
    pub fn code(&self) -> &'static str {
        match self {
            ProvisioningError::Conflict(_) => "CONFLICT",
            ProvisioningError::Validation { .. } => "VALIDATION_ERROR",
            ProvisioningError::NotFound(_) => "NOT_FOUND",
            ProvisioningError::InvalidTransition { .. } => "INVALID_TRANSITION",
            ProvisioningError::Write { .. } => "WRITE_ERROR",
            ProvisioningError::Reload { .. } => "RELOAD_ERROR",
            ProvisioningError::Generator(_) => "GENERATOR_ERROR",
            ProvisioningError::Storage(_) => "STORAGE_ERROR",
            ProvisioningError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            ProvisioningError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProvisioningError::Conflict(_) | ProvisioningError::Validation { .. } => {
                StatusCode::BAD_REQUEST
            }
            ProvisioningError::NotFound(_) => StatusCode::NOT_FOUND,
            ProvisioningError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Identifier the error refers to, when it concerns one account.
    pub fn identifier(&self) -> Option<&str> {
        match self {
            ProvisioningError::Conflict(id)
            | ProvisioningError::NotFound(id)
            | ProvisioningError::InvalidTransition { identifier: id, .. }
            | ProvisioningError::Write { identifier: id, .. }
            | ProvisioningError::Reload { identifier: id, .. } => Some(id.as_str()),
            _ => None,
        }
    }

    /// Operator action needed after a partial failure.
    ///
    /// Only failures that leave a reservation or a configuration block behind
    /// need remediation; everything else is safe to retry as-is.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            ProvisioningError::Write { .. } => Some(
                "The identifier stays reserved but no configuration was written. \
                 An administrator must inspect the PJSIP configuration before the account can be provisioned.",
            ),
            ProvisioningError::Reload { .. } => Some(
                "The account was written to the PJSIP configuration but the server did not reload. \
                 An administrator must reload the PJSIP module; do not register the account again.",
            ),
            _ => None,
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl IntoResponse for ProvisioningError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
            identifier: self.identifier().map(String::from),
            remediation: self.remediation().map(String::from),
        };

        let retry_after = match &self {
            ProvisioningError::RateLimitExceeded { retry_after } => Some(retry_after_secs(*retry_after)),
            _ => None,
        };

        let mut response = (self.status(), Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Whole seconds for `Retry-After`, rounded up and never zero.
fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

/// Malformed or incomplete request bodies are input errors like any other.
impl From<JsonRejection> for ProvisioningError {
    fn from(rejection: JsonRejection) -> Self {
        ProvisioningError::validation("body", rejection.body_text())
    }
}

impl From<std::io::Error> for ProvisioningError {
    fn from(e: std::io::Error) -> Self {
        ProvisioningError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for ProvisioningError {
    fn from(e: serde_json::Error) -> Self {
        ProvisioningError::Storage(format!("JSON serialization error: {}", e))
    }
}
