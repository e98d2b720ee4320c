//! Rendezvous registry for waiting transfers
//!
//! Maps a transfer identifier to the single-use handoff channel of a waiting
//! upload and to the metadata the download side may show. Every operation
//! takes the lock briefly and never across an await, so the registry is safe
//! to share between the SSH and HTTP sides as a plain `Arc`.
//!
//! Lookups never fail loudly: callers branch on `Option`/`bool`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::time::Instant;
use trisend_common::{TransferId, TransferMetadata};

use super::handoff::{HandoffReceiver, HandoffSender, handoff_channel};

/// A registered transfer
struct Entry {
    /// Taken by the first successful `resolve`
    handoff_tx: Option<HandoffSender>,
    metadata: TransferMetadata,
}

/// Registry of transfers waiting for (or paired with) a downloader
pub struct TransferRegistry {
    transfers: Mutex<HashMap<TransferId, Entry>>,
}

impl TransferRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            transfers: Mutex::new(HashMap::new()),
        }
    }

    /// Store a handoff channel and metadata under `id`
    ///
    /// Returns `false` and stores nothing if `id` is already registered.
    pub fn register(
        &self,
        id: TransferId,
        handoff_tx: HandoffSender,
        metadata: TransferMetadata,
    ) -> bool {
        let mut transfers = self
            .transfers
            .lock()
            .expect("transfer registry lock poisoned");

        if transfers.contains_key(&id) {
            return false;
        }
        transfers.insert(
            id,
            Entry {
                handoff_tx: Some(handoff_tx),
                metadata,
            },
        );
        true
    }

    /// Register under a freshly generated identifier
    ///
    /// Returns the identifier and the receiving half of the new handoff
    /// channel.
    pub fn register_new(&self, metadata: TransferMetadata) -> (TransferId, HandoffReceiver) {
        loop {
            let id = TransferId::generate();
            let (tx, rx) = handoff_channel();
            if self.register(id.clone(), tx, metadata.clone()) {
                return (id, rx);
            }
        }
    }

    /// Claim the handoff channel of a live transfer
    ///
    /// Returns `None` if the transfer is unknown, expired, or was already
    /// resolved by another request. Expired entries are dropped on the way.
    pub fn resolve(&self, id: &TransferId) -> Option<(HandoffSender, TransferMetadata)> {
        let mut transfers = self
            .transfers
            .lock()
            .expect("transfer registry lock poisoned");

        let entry = transfers.get_mut(id)?;
        if entry.metadata.is_expired() {
            transfers.remove(id);
            return None;
        }
        let tx = entry.handoff_tx.take()?;
        Some((tx, entry.metadata.clone()))
    }

    /// Read the metadata of a live transfer without claiming it
    pub fn peek_metadata(&self, id: &TransferId) -> Option<TransferMetadata> {
        let transfers = self
            .transfers
            .lock()
            .expect("transfer registry lock poisoned");

        transfers
            .get(id)
            .filter(|entry| !entry.metadata.is_expired())
            .map(|entry| entry.metadata.clone())
    }

    /// Remove a transfer (idempotent)
    pub fn delete(&self, id: &TransferId) {
        self.transfers
            .lock()
            .expect("transfer registry lock poisoned")
            .remove(id);
    }

    /// Remove every expired transfer, returning how many were removed
    ///
    /// Dropping an entry drops its unclaimed handoff sender, which wakes a
    /// producer still waiting on it.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut transfers = self
            .transfers
            .lock()
            .expect("transfer registry lock poisoned");

        let before = transfers.len();
        transfers.retain(|_, entry| !entry.metadata.is_expired_at(now));
        before - transfers.len()
    }

    /// Get the number of registered transfers
    pub fn active_count(&self) -> usize {
        self.transfers
            .lock()
            .expect("transfer registry lock poisoned")
            .len()
    }
}

impl Default for TransferRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard that deletes a registry entry when dropped
///
/// Held by the producer for the life of its session and by the HTTP body
/// stream, so an entry never outlives both sides.
#[must_use]
pub struct RegistrationGuard {
    registry: Arc<TransferRegistry>,
    id: TransferId,
}

impl RegistrationGuard {
    /// Create a new guard that will delete the entry on drop
    pub fn new(registry: Arc<TransferRegistry>, id: TransferId) -> Self {
        Self { registry, id }
    }

    /// Get the transfer ID
    pub fn id(&self) -> &TransferId {
        &self.id
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.delete(&self.id);
    }
}
