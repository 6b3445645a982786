use crate::{
    error::{IngestError, StoreError},
    store::{keys, KeyValueStore, KeyValueStoreExt, WriteBatch},
    types::{AddDelType, EventLogBatch, SyncCheckpoint},
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// A pushed set of records together with the channel its acknowledgement goes back on.
#[derive(Debug)]
pub struct IngestRequest {
    pub records: Vec<EventLogBatch>,
    pub ack: oneshot::Sender<Result<(), IngestError>>,
}

/// Sender side of the ingestion hand-off, used by the push endpoint.
#[derive(Clone)]
pub struct IngestHandle {
    request_tx: mpsc::Sender<IngestRequest>,
}

impl IngestHandle {
    /// Hands `records` to the ingestion task and waits until they are committed.
    pub async fn ingest(&self, records: Vec<EventLogBatch>) -> Result<(), IngestError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.request_tx
            .send(IngestRequest {
                records,
                ack: ack_tx,
            })
            .await
            .map_err(|_| IngestError::ServiceClosed)?;
        ack_rx.await.map_err(|_| IngestError::ServiceClosed)?
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub added: usize,
    pub deleted: usize,
    pub duplicates: usize,
    pub malformed: usize,
}

/// Owns the sync checkpoint. Only the ingestion task holds one.
pub struct EventLogIngestor {
    store: Arc<dyn KeyValueStore>,
    checkpoint: SyncCheckpoint,
}

impl EventLogIngestor {
    /// Loads the persisted checkpoint, falling back to `start` on a fresh store.
    pub fn load(store: Arc<dyn KeyValueStore>, start: SyncCheckpoint) -> Result<Self, StoreError> {
        let checkpoint = store
            .get_json::<SyncCheckpoint>(keys::EVM_LOG_CHECKPOINT)?
            .unwrap_or(start);
        info!(
            last_sequence = checkpoint.last_sequence,
            last_height = checkpoint.last_height,
            "Loaded event log sync checkpoint"
        );
        Ok(Self { store, checkpoint })
    }

    pub fn checkpoint(&self) -> SyncCheckpoint {
        self.checkpoint
    }

    /// Applies `records` in order and commits them with the new checkpoint in
    /// one durable write. On error nothing is applied.
    pub fn ingest(&mut self, records: Vec<EventLogBatch>) -> Result<IngestSummary, IngestError> {
        let mut next = self.checkpoint;
        let mut writes = WriteBatch::new();
        let mut summary = IngestSummary::default();

        for record in records {
            if record.seq_num <= next.last_sequence {
                warn!(
                    seq = record.seq_num,
                    height = record.height,
                    last_sequence = next.last_sequence,
                    "Skipping duplicate or out-of-order event log record"
                );
                summary.duplicates += 1;
                continue;
            }

            match AddDelType::try_from(record.add_del_type) {
                Ok(AddDelType::Add) => {
                    debug!(seq = record.seq_num, height = record.height, "Storing event log batch");
                    next.last_sequence = record.seq_num;
                    next.last_height = record.height;
                    writes.put_json(keys::evm_log_batch(record.height), &record)?;
                    summary.added += 1;
                }
                Ok(AddDelType::Del) => {
                    warn!(seq = record.seq_num, height = record.height, "Rolling back reorged height");
                    if record.height > 0 {
                        writes.delete(keys::evm_log_batch(record.height));
                    }
                    next.last_sequence = record.seq_num;
                    next.last_height = record.height.saturating_sub(1);
                    summary.deleted += 1;
                }
                Err(marker) => {
                    error!(
                        seq = record.seq_num,
                        height = record.height,
                        marker,
                        "Dropping record with unknown add/del marker"
                    );
                    summary.malformed += 1;
                }
            }
        }

        if next == self.checkpoint {
            return Ok(summary);
        }

        writes.put_json(keys::EVM_LOG_CHECKPOINT, &next)?;
        self.store.write_batch(writes, true)?;
        self.checkpoint = next;
        Ok(summary)
    }
}

/// The task that owns the ingestor and answers push hand-offs.
pub struct IngestionService {
    ingestor: EventLogIngestor,
    request_rx: mpsc::Receiver<IngestRequest>,
}

impl IngestionService {
    pub fn new(ingestor: EventLogIngestor) -> (Self, IngestHandle) {
        // Capacity 1: a pusher waits for the previous hand-off to be picked up.
        let (request_tx, request_rx) = mpsc::channel(1);
        (
            Self {
                ingestor,
                request_rx,
            },
            IngestHandle { request_tx },
        )
    }

    #[instrument(skip_all, name = "ingestion_service")]
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Starting event log ingestion");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Ingestion cancelled");
                    return;
                }
                request = self.request_rx.recv() => {
                    let Some(request) = request else {
                        info!("All ingest handles dropped, stopping ingestion");
                        return;
                    };
                    let result = match self.ingestor.ingest(request.records) {
                        Ok(summary) => {
                            let checkpoint = self.ingestor.checkpoint();
                            info!(
                                added = summary.added,
                                deleted = summary.deleted,
                                duplicates = summary.duplicates,
                                malformed = summary.malformed,
                                last_sequence = checkpoint.last_sequence,
                                last_height = checkpoint.last_height,
                                "Ingested event log records"
                            );
                            Ok(())
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to ingest event log records");
                            Err(e)
                        }
                    };
                    if request.ack.send(result).is_err() {
                        warn!("Pusher went away before the ack was delivered");
                    }
                }
            }
        }
    }
}
