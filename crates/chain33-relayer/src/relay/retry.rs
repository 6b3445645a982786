use crate::{
    error::StoreError,
    store::{keys, KeyValueStore, KeyValueStoreExt, ListDirection},
    types::ClaimRequest,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A claim request whose relay failed and is waiting for another attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRelay {
    pub request: ClaimRequest,
    pub attempts: u32,
    pub last_error: String,
}

fn key(request: &ClaimRequest) -> Vec<u8> {
    keys::relay_retry(request.claim_type, request.nonce, &request.source_tx_hash)
}

/// Durable queue of failed relays. Entries survive restarts and are drained
/// by the relay engine.
#[derive(Clone)]
pub struct RetryQueue {
    store: Arc<dyn KeyValueStore>,
}

impl RetryQueue {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Inserts or replaces the entry for `pending.request`.
    pub fn put(&self, pending: &PendingRelay) -> Result<(), StoreError> {
        self.store.set_json_sync(&key(&pending.request), pending)
    }

    pub fn remove(&self, request: &ClaimRequest) -> Result<(), StoreError> {
        self.store.delete(&key(request))
    }

    pub fn pending(&self) -> Result<Vec<PendingRelay>, StoreError> {
        self.store.list_json(
            keys::RELAY_RETRY_PREFIX.as_bytes(),
            None,
            0,
            ListDirection::Ascending,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{store::MemoryStore, test_utils::sample_request, types::ClaimType};

    #[test]
    fn entries_survive_reopen_and_replace_in_place() {
        let store = Arc::new(MemoryStore::new());
        let queue = RetryQueue::new(store.clone());
        let mut pending = PendingRelay {
            request: sample_request(ClaimType::Burn, "USDT", 10, 12),
            attempts: 1,
            last_error: "execution reverted".to_string(),
        };
        queue.put(&pending).unwrap();
        queue
            .put(&PendingRelay {
                request: sample_request(ClaimType::Burn, "USDT", 10, 3),
                attempts: 1,
                last_error: String::new(),
            })
            .unwrap();

        pending.attempts = 2;
        queue.put(&pending).unwrap();

        let reopened = RetryQueue::new(store);
        let entries = reopened.pending().unwrap();
        let nonces: Vec<_> = entries.iter().map(|p| p.request.nonce.as_u64()).collect();
        assert_eq!(nonces, vec![3, 12]);
        assert_eq!(entries[1].attempts, 2);

        reopened.remove(&pending.request).unwrap();
        assert_eq!(reopened.pending().unwrap().len(), 1);
    }
}
