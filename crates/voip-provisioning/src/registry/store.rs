//! Snapshot persistence for the registry.

use super::Registry;
use crate::error::ProvisioningError;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// JSON snapshot of the registry on local disk.
///
/// Records only carry secret hashes, so the snapshot holds no credential
/// that could be replayed against the telephony server.
pub struct FileStore {
    storage_path: PathBuf,
}

impl FileStore {
    /// Create a new file store.
    pub fn new(storage_path: PathBuf) -> Self {
        Self { storage_path }
    }

    /// Save the registry snapshot.
    ///
    /// The snapshot is synced to a temp file and renamed over the previous
    /// one, so a crash leaves either the old or the new snapshot.
    pub async fn save(&self, registry: &Registry) -> Result<(), ProvisioningError> {
        let data = serde_json::to_vec_pretty(registry)?;

        // Ensure parent directory exists
        if let Some(parent) = self.storage_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = self.storage_path.with_extension("tmp");
        let result = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &self.storage_path).await
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        debug!(
            "Saved registry ({} bytes) to {:?}",
            data.len(),
            self.storage_path
        );
        Ok(())
    }

    /// Load the registry snapshot.
    ///
    /// Returns an empty registry if the file doesn't exist.
    pub async fn load(&self) -> Result<Registry, ProvisioningError> {
        if !fs::try_exists(&self.storage_path).await? {
            info!(
                "Registry file not found at {:?}, starting with empty registry",
                self.storage_path
            );
            return Ok(Registry::new());
        }

        let data = fs::read(&self.storage_path).await?;
        if data.is_empty() {
            warn!("Registry file is empty, starting with empty registry");
            return Ok(Registry::new());
        }

        let registry: Registry = serde_json::from_slice(&data)?;

        info!(
            "Loaded registry with {} records from {:?}",
            registry.count(),
            self.storage_path
        );
        Ok(registry)
    }
}

/// In-memory store for testing or when persistence is disabled.
pub struct MemoryStore;

impl MemoryStore {
    /// "Save" does nothing for memory store.
    pub async fn save(&self, _registry: &Registry) -> Result<(), ProvisioningError> {
        debug!("Memory store: save is a no-op");
        Ok(())
    }

    /// "Load" returns an empty registry.
    pub async fn load(&self) -> Result<Registry, ProvisioningError> {
        debug!("Memory store: returning empty registry");
        Ok(Registry::new())
    }
}

/// Storage backend for the registry.
pub enum Store {
    /// JSON snapshot on disk
    File(FileStore),
    /// In-memory only (no persistence)
    Memory(MemoryStore),
}

impl Store {
    pub fn file(storage_path: PathBuf) -> Self {
        Store::File(FileStore::new(storage_path))
    }

    pub fn memory() -> Self {
        Store::Memory(MemoryStore)
    }

    /// Save the registry.
    pub async fn save(&self, registry: &Registry) -> Result<(), ProvisioningError> {
        match self {
            Store::File(s) => s.save(registry).await,
            Store::Memory(s) => s.save(registry).await,
        }
    }

    /// Load the registry.
    pub async fn load(&self) -> Result<Registry, ProvisioningError> {
        match self {
            Store::File(s) => s.load().await,
            Store::Memory(s) => s.load().await,
        }
    }
}
