use super::statistics::{StatisticsFilter, StatisticsLedger};
use crate::{
    client::{DestinationChain, ExecutionResult},
    error::StoreError,
    types::{ClaimType, TxStatus},
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub updated: usize,
    pub checkpoint: u64,
    /// Index of the first record still waiting for a result.
    pub stalled_at: Option<u64>,
}

/// Moves `Pending` statistics to their final status, per claim type, in
/// index order.
///
/// Claims are submitted sequentially from a single key, so the first record
/// without a result ends the pass: later indices cannot have been included
/// before it.
pub struct StatusReconciler {
    ledger: Arc<StatisticsLedger>,
    destination: Arc<dyn DestinationChain>,
}

impl StatusReconciler {
    pub fn new(ledger: Arc<StatisticsLedger>, destination: Arc<dyn DestinationChain>) -> Self {
        Self {
            ledger,
            destination,
        }
    }

    pub async fn reconcile(&self) -> Result<(), StoreError> {
        for claim_type in ClaimType::ALL {
            let summary = self.reconcile_claim_type(claim_type).await?;
            if summary.updated > 0 {
                info!(
                    %claim_type,
                    updated = summary.updated,
                    checkpoint = summary.checkpoint,
                    "Reconciled relay statuses"
                );
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn reconcile_claim_type(
        &self,
        claim_type: ClaimType,
    ) -> Result<ReconcileSummary, StoreError> {
        let mut summary = ReconcileSummary {
            checkpoint: self.ledger.checkpoint(claim_type)?,
            ..Default::default()
        };
        let records =
            self.ledger
                .list(claim_type, summary.checkpoint, 0, &StatisticsFilter::default())?;

        for record in records {
            if record.status.is_final() {
                self.ledger.set_checkpoint(claim_type, record.tx_index)?;
                summary.checkpoint = record.tx_index;
                continue;
            }

            let status = match self.destination.execution_result(record.dest_tx_hash).await {
                Ok(Some(ExecutionResult::Success)) => TxStatus::Success,
                Ok(Some(ExecutionResult::Failed)) => TxStatus::Failed,
                Ok(None) => {
                    debug!(tx_index = record.tx_index, tx_hash = ?record.dest_tx_hash, "No receipt yet");
                    summary.stalled_at = Some(record.tx_index);
                    break;
                }
                Err(e) => {
                    warn!(error = %e, tx_index = record.tx_index, "Failed to query execution result");
                    summary.stalled_at = Some(record.tx_index);
                    break;
                }
            };

            if self.ledger.finalize(&record, status)? {
                summary.updated += 1;
                info!(tx_index = record.tx_index, ?status, tx_hash = ?record.dest_tx_hash, "Relay status updated");
            }
            self.ledger.set_checkpoint(claim_type, record.tx_index)?;
            summary.checkpoint = record.tx_index;
        }

        Ok(summary)
    }
}
