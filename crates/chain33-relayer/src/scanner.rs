use crate::{
    client::SourceChain,
    decoder::EventDecoder,
    error::RelayerError,
    relay::StatusReconciler,
    state::RelayerState,
    store::{keys, KeyValueStore, KeyValueStoreExt},
    sync::EventLogStore,
    types::{ClaimRequest, EventLogBatch},
};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Filters a batch down to bridge-bank events and forwards them as claim requests.
#[derive(Clone)]
pub struct EventDispatcher {
    events: EventLogStore,
    decoder: EventDecoder,
    claim_tx: mpsc::Sender<ClaimRequest>,
    bridge_bank: String,
    source_decimals: u8,
}

impl EventDispatcher {
    pub fn new(
        events: EventLogStore,
        claim_tx: mpsc::Sender<ClaimRequest>,
        bridge_bank: String,
        source_decimals: u8,
    ) -> Result<Self, RelayerError> {
        Ok(Self {
            events,
            decoder: EventDecoder::new()?,
            claim_tx,
            bridge_bank,
            source_decimals,
        })
    }

    /// Dispatches every matching event in transaction order, then log order.
    /// Returns the number of claim requests sent.
    pub async fn dispatch_batch(&self, batch: &EventLogBatch) -> Result<usize, RelayerError> {
        let mut dispatched = 0;

        for entry in &batch.tx_and_logs {
            let tx = &entry.tx;
            if !tx.execer.contains("evm") {
                debug!(height = batch.height, tx_hash = ?tx.hash, execer = %tx.execer, "Skipping non-evm tx");
                continue;
            }
            if !tx.contract_addr.eq_ignore_ascii_case(&self.bridge_bank) {
                debug!(height = batch.height, tx_hash = ?tx.hash, contract = %tx.contract_addr, "Skipping tx for other contract");
                continue;
            }

            for log in &entry.logs {
                let Some(topic) = log.topics.first() else {
                    continue;
                };
                if !self.decoder.matches(topic) {
                    continue;
                }

                let event = self.decoder.decode(*topic, &log.data).map_err(|source| {
                    RelayerError::CorruptEvent {
                        height: batch.height,
                        tx_hash: tx.hash,
                        source,
                    }
                })?;
                let request = event.into_claim_request(tx.hash, self.source_decimals);
                info!(
                    height = batch.height,
                    tx_hash = ?tx.hash,
                    claim_type = %request.claim_type,
                    symbol = %request.symbol,
                    amount = %request.amount,
                    nonce = %request.nonce,
                    "Dispatching bridge event"
                );
                self.claim_tx
                    .send(request)
                    .await
                    .map_err(|e| RelayerError::ChannelError(e.to_string()))?;
                dispatched += 1;
            }
        }

        Ok(dispatched)
    }

    /// Re-dispatches the first stored batch above `height` without touching
    /// the scanner checkpoint. Returns the batch height, if any.
    pub async fn resend_height(&self, height: u64) -> Result<Option<(u64, usize)>, RelayerError> {
        let Some(batch) = self.events.next_batch_after(height)? else {
            return Ok(None);
        };
        let dispatched = self.dispatch_batch(&batch).await?;
        info!(requested = height, height = batch.height, dispatched, "Resent stored batch");
        Ok(Some((batch.height, dispatched)))
    }
}

#[derive(Debug, Clone)]
pub struct ScannerSettings {
    pub fetch_period: Duration,
    pub maturity_depth: u64,
    /// Used when no height has been processed yet.
    pub start_height: u64,
}

pub struct HeightScanner {
    source: Arc<dyn SourceChain>,
    events: EventLogStore,
    dispatcher: EventDispatcher,
    reconciler: StatusReconciler,
    state: Arc<RelayerState>,
    store: Arc<dyn KeyValueStore>,
    settings: ScannerSettings,
    last_processed_height: u64,
}

impl HeightScanner {
    pub fn new(
        source: Arc<dyn SourceChain>,
        store: Arc<dyn KeyValueStore>,
        dispatcher: EventDispatcher,
        reconciler: StatusReconciler,
        state: Arc<RelayerState>,
        settings: ScannerSettings,
    ) -> Result<Self, RelayerError> {
        let last_processed_height = store
            .get_json::<u64>(keys::SCANNER_LAST_HEIGHT)?
            .unwrap_or(settings.start_height);
        info!(last_processed_height, "Loaded scanner checkpoint");

        Ok(Self {
            source,
            events: EventLogStore::new(store.clone()),
            dispatcher,
            reconciler,
            state,
            store,
            settings,
            last_processed_height,
        })
    }

    pub fn last_processed_height(&self) -> u64 {
        self.last_processed_height
    }

    #[instrument(skip_all, name = "height_scanner")]
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), RelayerError> {
        let mut unlocked = self.state.unlocked();
        if !self.state.is_unlocked() {
            info!("Waiting for the relayer key before scanning");
        }
        while !self.state.is_unlocked() {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                changed = unlocked.changed() => {
                    changed.map_err(|e| RelayerError::ChannelError(e.to_string()))?;
                }
            }
        }

        if let Err(e) = self.reconciler.reconcile().await {
            error!(error = %e, "Initial status reconciliation failed");
        }

        info!(
            period_ms = self.settings.fetch_period.as_millis() as u64,
            maturity_depth = self.settings.maturity_depth,
            "Starting height scan"
        );
        let mut interval = tokio::time::interval(self.settings.fetch_period);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Height scan cancelled");
                    return Ok(());
                }
                _ = interval.tick() => {
                    self.tick().await?;
                }
            }
        }
    }

    async fn tick(&mut self) -> Result<(), RelayerError> {
        match self.source.current_height().await {
            Ok(current_height) => {
                self.on_new_height(current_height).await?;
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch current height, retrying next tick");
            }
        }

        if let Err(e) = self.reconciler.reconcile().await {
            error!(error = %e, "Status reconciliation failed");
        }
        Ok(())
    }

    /// Processes every stored batch that has matured at `current_height`.
    /// Returns the number of claim requests dispatched.
    pub async fn on_new_height(&mut self, current_height: u64) -> Result<usize, RelayerError> {
        let depth = self.settings.maturity_depth;
        let mut dispatched = 0;

        while self
            .last_processed_height
            .saturating_add(depth)
            .saturating_add(1)
            <= current_height
        {
            let Some(batch) = self.events.next_batch_after(self.last_processed_height)? else {
                debug!(last = self.last_processed_height, "No stored batch yet");
                break;
            };
            if current_height.saturating_sub(batch.height) < depth {
                debug!(height = batch.height, current_height, "Next batch not mature yet");
                break;
            }

            dispatched += self.dispatcher.dispatch_batch(&batch).await?;
            self.last_processed_height = batch.height;
            self.store
                .set_json_sync(keys::SCANNER_LAST_HEIGHT, &batch.height)?;
            debug!(height = batch.height, "Processed height");
        }

        Ok(dispatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::DecodeError,
        relay::StatisticsLedger,
        store::MemoryStore,
        test_utils::{
            bridge_batch, burn_log, lock_log, store_batch, MockDestination, MockSourceChain,
            BRIDGE_BANK,
            TEST_PRIVATE_KEY,
        },
        types::{ClaimType, EvmLog, EvmTx, TxAndLogs},
    };
    use ethers::types::{Address, Bytes, H256, U256};

    struct Harness {
        store: Arc<MemoryStore>,
        source: Arc<MockSourceChain>,
        state: Arc<RelayerState>,
        claim_rx: mpsc::Receiver<ClaimRequest>,
        dispatcher: EventDispatcher,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        EventLogStore::new(store.clone()).ensure_sentinel().unwrap();
        let (claim_tx, claim_rx) = mpsc::channel(16);
        let dispatcher = EventDispatcher::new(
            EventLogStore::new(store.clone()),
            claim_tx,
            BRIDGE_BANK.to_string(),
            8,
        )
        .unwrap();
        Harness {
            state: Arc::new(RelayerState::restore(store.clone(), "ethereum").unwrap()),
            source: Arc::new(MockSourceChain::new(0)),
            store,
            claim_rx,
            dispatcher,
        }
    }

    fn scanner(h: &Harness, maturity_depth: u64) -> HeightScanner {
        let ledger = Arc::new(StatisticsLedger::load(h.store.clone()).unwrap());
        let reconciler = StatusReconciler::new(ledger, Arc::new(MockDestination::new()));
        HeightScanner::new(
            h.source.clone(),
            h.store.clone(),
            h.dispatcher.clone(),
            reconciler,
            h.state.clone(),
            ScannerSettings {
                fetch_period: Duration::from_millis(5),
                maturity_depth,
                start_height: 0,
            },
        )
        .unwrap()
    }

    fn sample_lock() -> EvmLog {
        lock_log(
            Address::repeat_byte(0x11),
            Address::repeat_byte(0x22),
            "BTY",
            100,
            7,
        )
    }

    #[tokio::test]
    async fn dispatches_matured_lock() {
        let mut h = harness();
        store_batch(&h.store, &bridge_batch(1000, 1, vec![sample_lock()]));
        let mut scanner = scanner(&h, 5);

        assert_eq!(scanner.on_new_height(1006).await.unwrap(), 1);
        assert_eq!(scanner.last_processed_height(), 1000);

        let request = h.claim_rx.try_recv().unwrap();
        assert_eq!(request.claim_type, ClaimType::Lock);
        assert_eq!(request.symbol, "BTY");
        assert_eq!(request.amount, U256::from(100));
        assert_eq!(request.nonce, U256::from(7));
        assert_eq!(request.decimals, 8);
        assert_eq!(request.receiver, format!("0x{}", "22".repeat(20)));
    }

    #[tokio::test]
    async fn immature_height_is_not_dispatched() {
        let mut h = harness();
        store_batch(&h.store, &bridge_batch(1000, 1, vec![sample_lock()]));
        let mut scanner = scanner(&h, 5);

        assert_eq!(scanner.on_new_height(1004).await.unwrap(), 0);
        assert_eq!(scanner.last_processed_height(), 0);
        assert!(h.claim_rx.try_recv().is_err());

        assert_eq!(scanner.on_new_height(1005).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn checkpoint_survives_restart() {
        let mut h = harness();
        store_batch(&h.store, &bridge_batch(10, 1, vec![sample_lock()]));
        store_batch(&h.store, &bridge_batch(12, 2, vec![sample_lock()]));

        let mut first = scanner(&h, 1);
        assert_eq!(first.on_new_height(12).await.unwrap(), 1);
        assert_eq!(first.last_processed_height(), 10);
        drop(first);

        let mut restarted = scanner(&h, 1);
        assert_eq!(restarted.last_processed_height(), 10);
        assert_eq!(restarted.on_new_height(13).await.unwrap(), 1);
        assert_eq!(restarted.last_processed_height(), 12);
        assert_eq!(
            h.store.get_json::<u64>(keys::SCANNER_LAST_HEIGHT).unwrap(),
            Some(12)
        );
        assert!(h.claim_rx.try_recv().is_ok());
        assert!(h.claim_rx.try_recv().is_ok());
        assert!(h.claim_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn events_keep_log_order_within_a_batch() {
        let mut h = harness();
        let burn = burn_log(
            Address::repeat_byte(0x33),
            Address::repeat_byte(0x44),
            "USDT",
            250,
            8,
        );
        store_batch(&h.store, &bridge_batch(40, 1, vec![sample_lock(), burn]));
        let mut scanner = scanner(&h, 0);

        assert_eq!(scanner.on_new_height(40).await.unwrap(), 2);
        assert_eq!(h.claim_rx.try_recv().unwrap().claim_type, ClaimType::Lock);
        let burn = h.claim_rx.try_recv().unwrap();
        assert_eq!(burn.claim_type, ClaimType::Burn);
        assert_eq!(burn.symbol, "USDT");
        assert_eq!(burn.sender, format!("{:?}", Address::repeat_byte(0x33)));
        assert_eq!(burn.amount, U256::from(250));
    }

    #[tokio::test]
    async fn unrelated_traffic_is_skipped() {
        let mut h = harness();
        let mut batch = bridge_batch(3, 1, vec![sample_lock()]);
        batch.tx_and_logs.push(TxAndLogs {
            tx: EvmTx {
                hash: H256::repeat_byte(0xee),
                execer: "coins".to_string(),
                contract_addr: BRIDGE_BANK.to_string(),
            },
            logs: vec![sample_lock()],
        });
        batch.tx_and_logs.push(TxAndLogs {
            tx: EvmTx {
                hash: H256::repeat_byte(0xef),
                execer: "user.p.para.evm".to_string(),
                contract_addr: "0xsomeothercontract".to_string(),
            },
            logs: vec![sample_lock()],
        });
        batch.tx_and_logs[0].logs.push(EvmLog {
            topics: vec![H256::repeat_byte(0x99)],
            data: Bytes::new(),
        });
        batch.tx_and_logs[0].logs.push(EvmLog {
            topics: vec![],
            data: Bytes::new(),
        });

        assert_eq!(h.dispatcher.dispatch_batch(&batch).await.unwrap(), 1);
        assert!(h.claim_rx.try_recv().is_ok());
        assert!(h.claim_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn corrupt_event_is_fatal() {
        let h = harness();
        let mut log = sample_lock();
        log.data = Bytes::from(vec![0u8; 16]);
        let batch = bridge_batch(3, 1, vec![log]);

        let result = h.dispatcher.dispatch_batch(&batch).await;
        assert!(matches!(
            result,
            Err(RelayerError::CorruptEvent {
                height: 3,
                source: DecodeError::Abi { .. },
                ..
            })
        ));
    }

    #[tokio::test]
    async fn resend_replays_without_moving_the_checkpoint() {
        let mut h = harness();
        store_batch(&h.store, &bridge_batch(20, 1, vec![sample_lock()]));
        let mut scanner = scanner(&h, 0);
        scanner.on_new_height(30).await.unwrap();
        h.claim_rx.try_recv().unwrap();

        assert_eq!(h.dispatcher.resend_height(19).await.unwrap(), Some((20, 1)));
        assert!(h.claim_rx.try_recv().is_ok());
        assert_eq!(h.dispatcher.resend_height(20).await.unwrap(), None);
        assert_eq!(scanner.last_processed_height(), 20);
    }

    #[tokio::test]
    async fn run_waits_for_unlock_then_scans() {
        let mut h = harness();
        store_batch(&h.store, &bridge_batch(5, 1, vec![sample_lock()]));
        h.source.set_height(10);
        let scanner = scanner(&h, 2);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(scanner.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(h.claim_rx.try_recv().is_err());

        h.state.import_private_key(TEST_PRIVATE_KEY).await.unwrap();
        let request = tokio::time::timeout(Duration::from_secs(1), h.claim_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.symbol, "BTY");

        cancel.cancel();
        task.await.unwrap().unwrap();
    }
}
