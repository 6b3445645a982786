use crate::{
    error::StoreError,
    store::{keys, KeyValueStore, KeyValueStoreExt, ListDirection, WriteBatch},
    types::{Claim, ClaimType, RelayStatistic, TxStatus},
};
use ethers::types::H256;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tracing::{debug, info};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StatisticsFilter {
    pub status: Option<TxStatus>,
    pub symbol: Option<String>,
}

impl StatisticsFilter {
    fn accepts(&self, record: &RelayStatistic) -> bool {
        self.status.map_or(true, |status| status == record.status)
            && self.symbol.as_deref().map_or(true, |symbol| symbol == record.symbol)
    }
}

/// Append-only ledger of submitted claims, indexed by a global counter that
/// starts at 1 and survives restarts.
pub struct StatisticsLedger {
    store: Arc<dyn KeyValueStore>,
    total_tx: AtomicU64,
}

impl StatisticsLedger {
    pub fn load(store: Arc<dyn KeyValueStore>) -> Result<Self, StoreError> {
        let total_tx = store
            .get_json::<u64>(keys::STATISTICS_TOTAL_TX)?
            .unwrap_or_default();
        info!(total_tx, "Loaded relay statistics counter");
        Ok(Self {
            store,
            total_tx: AtomicU64::new(total_tx),
        })
    }

    pub fn total_tx(&self) -> u64 {
        self.total_tx.load(Ordering::SeqCst)
    }

    /// Assigns the next index to a submitted claim and persists it as `Pending`.
    pub fn record_pending(
        &self,
        claim: &Claim,
        dest_tx_hash: H256,
    ) -> Result<RelayStatistic, StoreError> {
        let tx_index = self.total_tx.fetch_add(1, Ordering::SeqCst) + 1;
        let record = RelayStatistic {
            tx_index,
            claim_type: claim.claim_type,
            status: TxStatus::Pending,
            source_tx_hash: claim.source_tx_hash.clone(),
            dest_tx_hash,
            sender: claim.sender.clone(),
            receiver: claim.receiver.clone(),
            symbol: claim.symbol.clone(),
            amount: claim.amount,
            nonce: claim.nonce,
        };

        if let Err(e) = self.commit(&record) {
            // Nothing was written, so the index is free again.
            let _ = self.total_tx.compare_exchange(
                tx_index,
                tx_index - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
            return Err(e);
        }
        Ok(record)
    }

    fn commit(&self, record: &RelayStatistic) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.put_json(keys::STATISTICS_TOTAL_TX, &record.tx_index)?;
        batch.put_json(keys::statistic(record.claim_type, record.tx_index), record)?;
        self.store.write_batch(batch, true)
    }

    pub fn get(&self, claim_type: ClaimType, tx_index: u64) -> Result<Option<RelayStatistic>, StoreError> {
        self.store.get_json(&keys::statistic(claim_type, tx_index))
    }

    /// Up to `count` records (0 = all) after index `from`, in ascending
    /// index order, then narrowed by `filter`.
    pub fn list(
        &self,
        claim_type: ClaimType,
        from: u64,
        count: usize,
        filter: &StatisticsFilter,
    ) -> Result<Vec<RelayStatistic>, StoreError> {
        let prefix = keys::statistics_prefix(claim_type);
        let start = keys::statistic(claim_type, from);
        let records: Vec<RelayStatistic> =
            self.store
                .list_json(&prefix, Some(&start), count, ListDirection::Ascending)?;
        Ok(records.into_iter().filter(|r| filter.accepts(r)).collect())
    }

    /// Moves a `Pending` record to its final status. Returns `false` when
    /// the record is already final and nothing was written.
    pub fn finalize(&self, record: &RelayStatistic, status: TxStatus) -> Result<bool, StoreError> {
        if record.status.is_final() || !status.is_final() {
            debug!(
                tx_index = record.tx_index,
                from = ?record.status,
                to = ?status,
                "Refusing status transition"
            );
            return Ok(false);
        }
        let updated = RelayStatistic {
            status,
            ..record.clone()
        };
        self.store
            .set_json_sync(&keys::statistic(record.claim_type, record.tx_index), &updated)?;
        Ok(true)
    }

    /// Highest reconciled index for `claim_type`; 0 before the first pass.
    pub fn checkpoint(&self, claim_type: ClaimType) -> Result<u64, StoreError> {
        Ok(self
            .store
            .get_json(&keys::statistics_checkpoint(claim_type))?
            .unwrap_or_default())
    }

    pub fn set_checkpoint(&self, claim_type: ClaimType, tx_index: u64) -> Result<(), StoreError> {
        self.store
            .set_json_sync(&keys::statistics_checkpoint(claim_type), &tx_index)
    }
}
