//! API request and response types.

use crate::registry::{AccountRecord, ProvisioningFailure, ProvisioningState};
use serde::{Deserialize, Serialize};

/// Request to register a new account.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    /// Account identifier (PJSIP section name and auth username)
    pub identifier: String,

    /// Contact email for the account holder
    pub contact_email: String,
}

/// Response after a successful registration.
///
/// `secret` is disclosed here and nowhere else.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub status: ProvisioningState,
    pub identifier: String,
    pub server_address: String,
    pub secret: String,
}

/// Account details for introspection. Never carries the secret.
#[derive(Debug, Serialize)]
pub struct AccountInfo {
    pub identifier: String,
    pub contact_email: String,
    pub state: ProvisioningState,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ProvisioningFailure>,
}

impl From<AccountRecord> for AccountInfo {
    fn from(record: AccountRecord) -> Self {
        Self {
            identifier: record.identifier,
            contact_email: record.contact_email,
            state: record.state,
            created_at: record.created_at.to_rfc3339(),
            failure: record.failure,
        }
    }
}

/// List of accounts.
#[derive(Debug, Serialize)]
pub struct AccountsResponse {
    pub accounts: Vec<AccountInfo>,
    pub total: usize,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub provisioned_users: usize,
    pub control_channel_healthy: bool,
}
