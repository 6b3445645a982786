//! Push-based ingestion of per-height EVM log batches.
//!
//! The node pushes batches in sequence order. Each hand-off blocks until the
//! batch is durably committed (or rejected), so the feed can never outrun
//! persistence and an unacknowledged batch is simply redelivered.

mod ingest;

pub use ingest::{EventLogIngestor, IngestHandle, IngestRequest, IngestionService};

use crate::{
    error::StoreError,
    store::{keys, KeyValueStore, KeyValueStoreExt, ListDirection},
    types::{EventLogBatch, SyncCheckpoint},
};
use std::sync::Arc;

/// Read-only view over the stored event-log batches.
#[derive(Clone)]
pub struct EventLogStore {
    store: Arc<dyn KeyValueStore>,
}

impl EventLogStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Writes the height-0 sentinel so range scans always have a lower bound.
    pub fn ensure_sentinel(&self) -> Result<(), StoreError> {
        let key = keys::evm_log_batch(0);
        if self.store.get(&key)?.is_none() {
            self.store.set_json_sync(&key, &EventLogBatch::sentinel())?;
        }
        Ok(())
    }

    pub fn checkpoint(&self) -> Result<SyncCheckpoint, StoreError> {
        Ok(self
            .store
            .get_json(keys::EVM_LOG_CHECKPOINT)?
            .unwrap_or_default())
    }

    pub fn batch_at(&self, height: u64) -> Result<Option<EventLogBatch>, StoreError> {
        self.store.get_json(&keys::evm_log_batch(height))
    }

    /// The first stored batch strictly above `height`.
    pub fn next_batch_after(&self, height: u64) -> Result<Option<EventLogBatch>, StoreError> {
        let start = keys::evm_log_batch(height);
        let mut batches: Vec<EventLogBatch> = self.store.list_json(
            keys::EVM_LOG_BATCH_PREFIX.as_bytes(),
            Some(&start),
            1,
            ListDirection::Ascending,
        )?;
        Ok(batches.pop())
    }
}
