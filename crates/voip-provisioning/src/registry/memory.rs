//! In-memory registry implementation.

use super::{AccountRecord, ProvisioningFailure, ProvisioningState};
use crate::error::ProvisioningError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// In-memory account registry.
///
/// Persisted records are never removed, so an identifier cannot be handed
/// out twice even when its provisioning failed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    /// Account records indexed by identifier
    records: HashMap<String, AccountRecord>,
}

impl Registry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    /// Insert a freshly reserved record unless the identifier is taken.
    pub fn reserve(&mut self, record: AccountRecord) -> Result<&AccountRecord, ProvisioningError> {
        use std::collections::hash_map::Entry;

        match self.records.entry(record.identifier.clone()) {
            Entry::Occupied(entry) => Err(ProvisioningError::Conflict(entry.key().clone())),
            Entry::Vacant(entry) => Ok(entry.insert(record)),
        }
    }

    /// Drop a reservation that never made it to disk.
    ///
    /// Only records still in `Reserved` can be released; anything further
    /// along has external side effects and must stay.
    pub fn release(&mut self, identifier: &str) -> Option<AccountRecord> {
        match self.records.get(identifier) {
            Some(record) if record.state == ProvisioningState::Reserved => {
                self.records.remove(identifier)
            }
            _ => None,
        }
    }

    /// Move a record to the next state.
    pub fn advance(
        &mut self,
        identifier: &str,
        next: ProvisioningState,
    ) -> Result<&AccountRecord, ProvisioningError> {
        self.transition(identifier, next, None)
    }

    /// Move a record to `Failed`, remembering the last stage it reached.
    pub fn fail(
        &mut self,
        identifier: &str,
        reason: impl Into<String>,
    ) -> Result<&AccountRecord, ProvisioningError> {
        self.transition(identifier, ProvisioningState::Failed, Some(reason.into()))
    }

    fn transition(
        &mut self,
        identifier: &str,
        next: ProvisioningState,
        reason: Option<String>,
    ) -> Result<&AccountRecord, ProvisioningError> {
        let record = self
            .records
            .get_mut(identifier)
            .ok_or_else(|| ProvisioningError::NotFound(identifier.to_string()))?;

        if !record.state.can_advance_to(next) {
            return Err(ProvisioningError::InvalidTransition {
                identifier: identifier.to_string(),
                from: record.state,
                to: next,
            });
        }

        if next == ProvisioningState::Failed {
            record.failure = Some(ProvisioningFailure {
                reached: record.state,
                reason,
                failed_at: Utc::now(),
            });
        }
        record.state = next;

        Ok(record)
    }

    /// Get a record by identifier.
    pub fn get(&self, identifier: &str) -> Option<&AccountRecord> {
        self.records.get(identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.records.contains_key(identifier)
    }

    /// List all records, oldest first.
    pub fn list_all(&self) -> Vec<&AccountRecord> {
        let mut records: Vec<_> = self.records.values().collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.identifier.cmp(&b.identifier))
        });
        records
    }

    /// Number of identifiers ever reserved.
    pub fn count(&self) -> usize {
        self.records.len()
    }

    /// Number of records currently in `state`.
    pub fn count_in(&self, state: ProvisioningState) -> usize {
        self.records.values().filter(|r| r.state == state).count()
    }
}
