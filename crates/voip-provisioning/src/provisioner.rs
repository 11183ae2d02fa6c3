//! Registration pipeline: reserve, write, reload.

use crate::error::ProvisioningError;
use crate::pjsip::ConfigWriter;
use crate::registry::{
    hash_secret, validate_email, validate_identifier, AccountRegistry, ProvisioningState,
};
use crate::reload::ReloadCoordinator;
use crate::secret::{self, RawSecret};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// A successfully provisioned account.
///
/// This is the only place the plaintext secret ever leaves the service.
#[derive(Debug)]
pub struct ProvisionedAccount {
    pub identifier: String,
    pub secret: RawSecret,
    pub server_address: String,
    pub state: ProvisioningState,
}

/// Composes the registry, config writer and reload coordinator.
#[derive(Clone)]
pub struct Provisioner {
    registry: AccountRegistry,
    writer: Arc<dyn ConfigWriter>,
    reloader: Arc<ReloadCoordinator>,
    server_address: String,
}

impl Provisioner {
    pub fn new(
        registry: AccountRegistry,
        writer: Arc<dyn ConfigWriter>,
        reloader: Arc<ReloadCoordinator>,
        server_address: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            writer,
            reloader,
            server_address: server_address.into(),
        }
    }

    pub fn registry(&self) -> &AccountRegistry {
        &self.registry
    }

    pub fn reloader(&self) -> &ReloadCoordinator {
        &self.reloader
    }

    /// Register a new account and make it live.
    ///
    /// Input errors, secret generation errors and conflicts are reported
    /// before anything is written. Once the identifier is reserved it stays
    /// reserved: a write or reload failure moves the record to `Failed` and
    /// is returned to the caller, and nothing already written is rolled back.
    #[instrument(skip(self, contact_email))]
    pub async fn register_account(
        &self,
        identifier: &str,
        contact_email: &str,
    ) -> Result<ProvisionedAccount, ProvisioningError> {
        validate_identifier(identifier)?;
        validate_email(contact_email)?;

        let secret = secret::generate()?;

        let record = self
            .registry
            .reserve(identifier, contact_email, hash_secret(secret.expose()))
            .await
            .inspect_err(|e| {
                if matches!(e, ProvisioningError::Conflict(_)) {
                    warn!("Attempted registration of existing identifier");
                }
            })?;
        info!("Identifier reserved");

        if let Err(e) = self.writer.append(&record, &secret).await {
            error!("Config write failed: {}", e);
            self.mark_failed(identifier, &e).await;
            return Err(e);
        }
        self.registry
            .advance(identifier, ProvisioningState::ConfigWritten)
            .await?;

        if let Err(e) = self.reloader.activate().await {
            let e = ProvisioningError::Reload {
                identifier: identifier.to_string(),
                message: e.to_string(),
            };
            error!("Reload failed after config write: {}", e);
            self.mark_failed(identifier, &e).await;
            return Err(e);
        }
        let record = self
            .registry
            .advance(identifier, ProvisioningState::Activated)
            .await?;

        info!("Account provisioned");

        Ok(ProvisionedAccount {
            identifier: record.identifier,
            secret,
            server_address: self.server_address.clone(),
            state: record.state,
        })
    }

    /// The original error is what the caller needs to see, so a failure to
    /// record it is only logged.
    async fn mark_failed(&self, identifier: &str, cause: &ProvisioningError) {
        if let Err(e) = self.registry.fail(identifier, cause.to_string()).await {
            error!("Failed to record provisioning failure: {}", e);
        }
    }
}
