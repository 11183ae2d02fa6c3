//! Account registry with optional snapshot persistence.

mod memory;
mod shared;
mod store;

pub use memory::Registry;
pub use shared::AccountRegistry;
pub use store::{FileStore, MemoryStore, Store};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ProvisioningError;

/// Maximum identifier length accepted by the config grammar.
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Maximum contact email length (RFC 5321 path limit).
pub const MAX_EMAIL_LEN: usize = 254;

/// Stage an account has reached in the provisioning pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningState {
    /// Identifier reserved, nothing written yet
    Reserved,
    /// Account block appended to the PJSIP configuration
    ConfigWritten,
    /// Telephony server reloaded after the write
    Activated,
    /// A later stage failed; see the record's failure details
    Failed,
}

impl ProvisioningState {
    /// Whether `next` directly follows this state.
    pub fn can_advance_to(self, next: ProvisioningState) -> bool {
        use ProvisioningState::*;
        matches!(
            (self, next),
            (Reserved, ConfigWritten)
                | (ConfigWritten, Activated)
                | (Reserved, Failed)
                | (ConfigWritten, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProvisioningState::Reserved => "reserved",
            ProvisioningState::ConfigWritten => "config_written",
            ProvisioningState::Activated => "activated",
            ProvisioningState::Failed => "failed",
        }
    }
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why and where provisioning stopped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvisioningFailure {
    /// Last stage that completed before the failure
    pub reached: ProvisioningState,

    /// Error reported by the failing stage
    pub reason: Option<String>,

    pub failed_at: DateTime<Utc>,
}

/// A provisioned (or partially provisioned) account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    /// Account identifier, also the PJSIP section name and auth username
    pub identifier: String,

    /// Contact email supplied at registration
    pub contact_email: String,

    /// SHA-256 hash of the one-time secret
    pub secret_hash: String,

    /// When the identifier was reserved
    pub created_at: DateTime<Utc>,

    /// Current provisioning stage
    pub state: ProvisioningState,

    /// Set once the record moves to `Failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ProvisioningFailure>,
}

impl AccountRecord {
    /// Create a freshly reserved record.
    pub fn reserved(identifier: String, contact_email: String, secret_hash: String) -> Self {
        Self {
            identifier,
            contact_email,
            secret_hash,
            created_at: Utc::now(),
            state: ProvisioningState::Reserved,
            failure: None,
        }
    }

    /// Check a candidate secret against the stored hash.
    pub fn verify_secret(&self, secret: &str) -> bool {
        hash_secret(secret) == self.secret_hash
    }

    /// Last stage that completed successfully.
    pub fn reached(&self) -> ProvisioningState {
        match &self.failure {
            Some(failure) => failure.reached,
            None => self.state,
        }
    }
}

/// Hash a secret using SHA-256.
pub fn hash_secret(secret: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Check that an identifier can be used as a PJSIP section name and username.
pub fn validate_identifier(identifier: &str) -> Result<(), ProvisioningError> {
    if identifier.is_empty() {
        return Err(ProvisioningError::validation(
            "identifier",
            "must not be empty",
        ));
    }

    if identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(ProvisioningError::validation(
            "identifier",
            format!("must be at most {} characters", MAX_IDENTIFIER_LEN),
        ));
    }

    if let Some(c) = identifier
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(ProvisioningError::validation(
            "identifier",
            format!("character {:?} is not allowed", c),
        ));
    }

    Ok(())
}

/// Basic syntactic check of a contact email address.
pub fn validate_email(email: &str) -> Result<(), ProvisioningError> {
    if email.len() < 3 || email.len() > MAX_EMAIL_LEN {
        return Err(ProvisioningError::validation(
            "contact_email",
            format!("must be between 3 and {} characters", MAX_EMAIL_LEN),
        ));
    }

    if email.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ProvisioningError::validation(
            "contact_email",
            "must not contain whitespace",
        ));
    }

    let (local, domain) = match email.split_once('@') {
        Some(parts) => parts,
        None => return Err(ProvisioningError::validation("contact_email", "missing '@'")),
    };

    if local.is_empty() || domain.contains('@') {
        return Err(ProvisioningError::validation(
            "contact_email",
            "must contain exactly one '@' after a non-empty local part",
        ));
    }

    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(ProvisioningError::validation(
            "contact_email",
            "domain is not valid",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_secret() {
        let hash1 = hash_secret("test");
        let hash2 = hash_secret("test");
        let hash3 = hash_secret("different");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_state_transitions() {
        use ProvisioningState::*;

        assert!(Reserved.can_advance_to(ConfigWritten));
        assert!(ConfigWritten.can_advance_to(Activated));
        assert!(Reserved.can_advance_to(Failed));
        assert!(ConfigWritten.can_advance_to(Failed));

        assert!(!Reserved.can_advance_to(Activated));
        assert!(!ConfigWritten.can_advance_to(Reserved));
        assert!(!Activated.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Activated));
        assert!(!Reserved.can_advance_to(Reserved));
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&ProvisioningState::ConfigWritten).unwrap();
        assert_eq!(json, "\"config_written\"");
        assert_eq!(ProvisioningState::ConfigWritten.to_string(), "config_written");
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("alice123").is_ok());
        assert!(validate_identifier("front-desk_2.lobby").is_ok());

        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("alice]").is_err());
        assert!(validate_identifier("[alice").is_err());
        assert!(validate_identifier("alice\npassword=x").is_err());
        assert!(validate_identifier("alice bob").is_err());
        assert!(validate_identifier("alice;comment").is_err());
        assert!(validate_identifier(&"a".repeat(MAX_IDENTIFIER_LEN + 1)).is_err());
        assert!(validate_identifier(&"a".repeat(MAX_IDENTIFIER_LEN)).is_ok());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("a.b+voip@mail.example.org").is_ok());

        assert!(validate_email("alice").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("alice@@example.com").is_err());
        assert!(validate_email("alice@localhost").is_err());
        assert!(validate_email("alice @example.com").is_err());
        assert!(validate_email("alice@example.com\n").is_err());
    }

    #[test]
    fn test_verify_secret() {
        let record = AccountRecord::reserved(
            "alice123".into(),
            "alice@example.com".into(),
            hash_secret("s3cret"),
        );

        assert!(record.verify_secret("s3cret"));
        assert!(!record.verify_secret("wrong"));
        assert_eq!(record.reached(), ProvisioningState::Reserved);
    }
}
