//! Turns claim requests into signed `newOracleClaim` transactions and keeps
//! the statistics ledger that tracks them.

pub mod claim;
mod reconciler;
mod retry;
mod statistics;

pub use reconciler::{ReconcileSummary, StatusReconciler};
pub use retry::{PendingRelay, RetryQueue};
pub use statistics::{StatisticsFilter, StatisticsLedger};

use crate::{
    client::DestinationChain,
    error::RelayError,
    state::RelayerState,
    types::{
        Claim, ClaimRequest, ClaimType, RelayStatistic, TokenAddressRecord, NATIVE_SYMBOL,
        NATIVE_TOKEN_ADDRESS,
    },
};
use ethers::types::Address;
use std::{str::FromStr, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Decimals of the native coin on the destination chain.
    pub native_decimals: u8,
    pub retry_period: Duration,
    /// Attempts per claim, counting the first one.
    pub max_attempts: u32,
}

pub struct ClaimRelayEngine {
    state: Arc<RelayerState>,
    destination: Arc<dyn DestinationChain>,
    ledger: Arc<StatisticsLedger>,
    retries: RetryQueue,
    settings: RelaySettings,
    claim_rx: mpsc::Receiver<ClaimRequest>,
}

impl ClaimRelayEngine {
    pub fn new(
        state: Arc<RelayerState>,
        destination: Arc<dyn DestinationChain>,
        ledger: Arc<StatisticsLedger>,
        retries: RetryQueue,
        settings: RelaySettings,
        claim_rx: mpsc::Receiver<ClaimRequest>,
    ) -> Self {
        Self {
            state,
            destination,
            ledger,
            retries,
            settings,
            claim_rx,
        }
    }

    #[instrument(skip_all, name = "claim_relay_engine")]
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(chain = %self.destination.chain_name(), "Starting claim relay");
        let mut retry_interval = tokio::time::interval(self.settings.retry_period);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Claim relay cancelled");
                    return;
                }
                request = self.claim_rx.recv() => {
                    let Some(request) = request else {
                        info!("Claim channel closed, stopping relay");
                        return;
                    };
                    self.handle(request).await;
                }
                _ = retry_interval.tick() => {
                    if let Err(e) = self.retry_pending().await {
                        error!(error = %e, "Failed to drain relay retry queue");
                    }
                }
            }
        }
    }

    /// Relays a freshly dispatched request. A retryable failure is queued
    /// durably for [`Self::retry_pending`].
    pub async fn handle(&self, request: ClaimRequest) {
        let source_tx = request.source_tx_hash.clone();
        match self.relay(request.clone()).await {
            Ok(_) => {}
            Err(e) if e.is_retryable() => {
                warn!(error = %e, %source_tx, "Relay failed, queued for retry");
                let pending = PendingRelay {
                    request,
                    attempts: 1,
                    last_error: e.to_string(),
                };
                if let Err(e) = self.retries.put(&pending) {
                    error!(error = %e, %source_tx, "Failed to queue claim for retry");
                }
            }
            Err(e) => {
                error!(error = %e, %source_tx, "Dropping claim that cannot be relayed");
            }
        }
    }

    /// Makes one more attempt at every queued claim. Nothing is attempted
    /// while the key is locked. Returns the number relayed.
    pub async fn retry_pending(&self) -> Result<usize, RelayError> {
        if !self.state.is_unlocked() {
            return Ok(0);
        }

        let mut relayed = 0;
        for mut pending in self.retries.pending()? {
            let source_tx = pending.request.source_tx_hash.clone();
            match self.relay(pending.request.clone()).await {
                Ok(record) => {
                    self.retries.remove(&pending.request)?;
                    info!(
                        %source_tx,
                        tx_index = record.tx_index,
                        attempts = pending.attempts + 1,
                        "Queued claim relayed"
                    );
                    relayed += 1;
                }
                Err(e) => {
                    pending.attempts += 1;
                    if !e.is_retryable() || pending.attempts >= self.settings.max_attempts {
                        error!(
                            error = %e,
                            %source_tx,
                            attempts = pending.attempts,
                            "Giving up on claim, resend the source height to try again"
                        );
                        self.retries.remove(&pending.request)?;
                    } else {
                        warn!(error = %e, %source_tx, attempts = pending.attempts, "Retry failed");
                        pending.last_error = e.to_string();
                        self.retries.put(&pending)?;
                    }
                }
            }
        }
        Ok(relayed)
    }

    /// Signs, submits and records one claim. Nothing is recorded unless the
    /// submission succeeded.
    #[instrument(skip(self, request), fields(
        claim_type = %request.claim_type,
        symbol = %request.symbol,
        nonce = %request.nonce,
        source_tx = %request.source_tx_hash
    ))]
    pub async fn relay(&self, request: ClaimRequest) -> Result<RelayStatistic, RelayError> {
        if !self.state.is_unlocked() {
            return Err(RelayError::Locked);
        }

        Address::from_str(&request.receiver).map_err(|_| RelayError::InvalidField {
            field: "receiver",
            value: request.receiver.clone(),
        })?;

        let claim_id = claim::compute_claim_id(
            request.nonce,
            &request.sender,
            &request.receiver,
            &request.symbol,
            request.amount,
        );
        let signature = self.state.sign_claim(claim_id).await?;
        let (token_address, token_decimals) = self
            .resolve_token(request.claim_type, &request.symbol)
            .await?;
        let amount = claim::adjust_precision(request.amount, request.decimals, token_decimals)?;

        let claim = Claim {
            claim_type: request.claim_type,
            sender: request.sender,
            receiver: request.receiver,
            token_address,
            symbol: request.symbol,
            amount,
            nonce: request.nonce,
            claim_id,
            signature,
            source_tx_hash: request.source_tx_hash,
        };

        let tx_hash = self
            .destination
            .submit_claim(&claim)
            .await
            .map_err(RelayError::Submission)?;
        let record = self.ledger.record_pending(&claim, tx_hash)?;

        info!(
            tx_index = record.tx_index,
            ?tx_hash,
            ?claim_id,
            %amount,
            "Claim relayed"
        );
        Ok(record)
    }

    /// Address and decimals of the destination token. Cache first, then the
    /// bridge bank and the token contract. A resolved token is persisted and
    /// never queried again.
    async fn resolve_token(
        &self,
        claim_type: ClaimType,
        symbol: &str,
    ) -> Result<(Address, u8), RelayError> {
        if symbol == NATIVE_SYMBOL {
            return Ok((NATIVE_TOKEN_ADDRESS, self.settings.native_decimals));
        }
        let lookup_error = |source| RelayError::TokenLookup {
            symbol: symbol.to_string(),
            source,
        };

        let address = match self.state.token_address_record(symbol).await {
            Some(TokenAddressRecord {
                address,
                decimals: Some(decimals),
                ..
            }) => return Ok((address, decimals)),
            Some(record) => record.address,
            None => self
                .destination
                .token_address(claim_type, symbol)
                .await
                .map_err(lookup_error)?
                .ok_or_else(|| RelayError::TokenNotFound {
                    symbol: symbol.to_string(),
                    claim_type,
                })?,
        };
        let decimals = self
            .destination
            .token_decimals(address)
            .await
            .map_err(lookup_error)?;

        self.state.set_token(symbol, address, decimals).await?;
        info!(symbol, ?address, decimals, "Resolved token");
        Ok((address, decimals))
    }
}
