//! Shared, synchronized access to the registry.

use super::{AccountRecord, ProvisioningState, Registry, Store};
use crate::error::ProvisioningError;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Handle to the account registry shared by all requests.
///
/// Every mutation happens under the write lock, which makes `reserve` an
/// atomic check-and-insert. The snapshot is saved while the lock is still
/// held so saves never overtake each other.
#[derive(Clone)]
pub struct AccountRegistry {
    inner: Arc<RwLock<Registry>>,
    store: Arc<Store>,
}

impl AccountRegistry {
    pub fn new(registry: Registry, store: Store) -> Self {
        Self {
            inner: Arc::new(RwLock::new(registry)),
            store: Arc::new(store),
        }
    }

    /// Registry without persistence.
    pub fn in_memory() -> Self {
        Self::new(Registry::new(), Store::memory())
    }

    /// Load the registry from `store`, starting empty if loading fails.
    pub async fn load(store: Store) -> Self {
        let registry = match store.load().await {
            Ok(r) => {
                info!("Loaded registry with {} records", r.count());
                r
            }
            Err(e) => {
                error!("Failed to load registry: {}", e);
                info!("Starting with empty registry");
                Registry::new()
            }
        };
        Self::new(registry, store)
    }

    /// Reserve an identifier.
    ///
    /// Fails with `Conflict` if the identifier was ever reserved before.
    /// If the snapshot cannot be saved the reservation is released again,
    /// so a `Storage` error leaves nothing behind.
    pub async fn reserve(
        &self,
        identifier: &str,
        contact_email: &str,
        secret_hash: String,
    ) -> Result<AccountRecord, ProvisioningError> {
        let mut registry = self.inner.write().await;
        let record = registry
            .reserve(AccountRecord::reserved(
                identifier.to_string(),
                contact_email.to_string(),
                secret_hash,
            ))?
            .clone();

        if let Err(e) = self.store.save(&registry).await {
            registry.release(identifier);
            warn!(identifier, "Reservation released after failed save: {}", e);
            return Err(e);
        }
        Ok(record)
    }

    /// Advance an account to the next stage.
    pub async fn advance(
        &self,
        identifier: &str,
        next: ProvisioningState,
    ) -> Result<AccountRecord, ProvisioningError> {
        let mut registry = self.inner.write().await;
        let record = registry.advance(identifier, next)?.clone();
        self.persist(&registry).await;
        Ok(record)
    }

    /// Mark an account as failed.
    pub async fn fail(
        &self,
        identifier: &str,
        reason: impl Into<String>,
    ) -> Result<AccountRecord, ProvisioningError> {
        let mut registry = self.inner.write().await;
        let record = registry.fail(identifier, reason)?.clone();
        self.persist(&registry).await;
        Ok(record)
    }

    /// Get a record by identifier.
    pub async fn get(&self, identifier: &str) -> Result<AccountRecord, ProvisioningError> {
        self.inner
            .read()
            .await
            .get(identifier)
            .cloned()
            .ok_or_else(|| ProvisioningError::NotFound(identifier.to_string()))
    }

    /// All records, oldest first.
    pub async fn list(&self) -> Vec<AccountRecord> {
        self.inner
            .read()
            .await
            .list_all()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Number of identifiers ever reserved.
    pub async fn count(&self) -> usize {
        self.inner.read().await.count()
    }

    pub async fn count_in(&self, state: ProvisioningState) -> usize {
        self.inner.read().await.count_in(state)
    }

    /// Later stages must not fail because of the snapshot: the external side
    /// effect already happened and memory stays authoritative.
    async fn persist(&self, registry: &Registry) {
        if let Err(e) = self.store.save(registry).await {
            error!("Failed to persist registry: {}", e);
        }
    }
}
