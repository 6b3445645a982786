use super::ServerState;
use crate::{
    error::{IngestError, RelayError, RelayerError, StoreError},
    relay::StatisticsFilter,
    types::{ClaimType, EventLogBatch, RelayStatistic, TokenAddressRecord, TxStatus},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg).into_response(),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<RelayerError> for ApiError {
    fn from(e: RelayerError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
pub struct PushBody {
    #[serde(rename = "logs4EVMPerBlk", default)]
    pub logs: Vec<EventLogBatch>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatisticsQuery {
    pub from: Option<u64>,
    pub count: Option<usize>,
    pub status: Option<String>,
    pub symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportKeyRequest {
    pub private_key: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportKeyResponse {
    pub address: Address,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResendResponse {
    pub height: u64,
    pub dispatched: usize,
}

pub async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// The node redelivers anything not answered with 200.
#[instrument(skip_all)]
pub async fn push_event_logs(
    State(state): State<ServerState>,
    Json(body): Json<PushBody>,
) -> Result<&'static str, ApiError> {
    let records = body.logs.len();
    state.ingest.ingest(body.logs).await.map_err(|e| {
        error!(error = %e, records, "Push rejected");
        ApiError::from(e)
    })?;
    Ok("ok")
}

pub async fn show_statistics(
    State(state): State<ServerState>,
    Path(claim_type): Path<String>,
    Query(query): Query<StatisticsQuery>,
) -> Result<Json<Vec<RelayStatistic>>, ApiError> {
    let claim_type: ClaimType = claim_type.parse().map_err(ApiError::BadRequest)?;
    let status = query
        .status
        .as_deref()
        .map(str::parse::<TxStatus>)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let filter = StatisticsFilter {
        status,
        symbol: query.symbol.filter(|s| !s.is_empty()),
    };

    let records = state.ledger.list(
        claim_type,
        query.from.unwrap_or_default(),
        query.count.unwrap_or_default(),
        &filter,
    )?;
    Ok(Json(records))
}

pub async fn show_tokens(State(state): State<ServerState>) -> Json<Vec<TokenAddressRecord>> {
    Json(state.relayer.token_addresses().await)
}

pub async fn show_token(
    State(state): State<ServerState>,
    Path(symbol): Path<String>,
) -> Result<Json<TokenAddressRecord>, ApiError> {
    state
        .relayer
        .token_address_record(&symbol)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no token address for {symbol}")))
}

pub async fn import_private_key(
    State(state): State<ServerState>,
    Json(request): Json<ImportKeyRequest>,
) -> Result<Json<ImportKeyResponse>, ApiError> {
    match state.relayer.import_private_key(&request.private_key).await {
        Ok(address) => Ok(Json(ImportKeyResponse { address })),
        Err(RelayError::InvalidKey(msg)) => {
            warn!("Rejected private key import");
            Err(ApiError::BadRequest(msg))
        }
        Err(e @ RelayError::AlreadyUnlocked) => {
            warn!("Refused to replace the imported relayer key");
            Err(ApiError::Conflict(e.to_string()))
        }
        Err(e) => Err(ApiError::Internal(e.to_string())),
    }
}

#[instrument(skip(state))]
pub async fn resend_height(
    State(state): State<ServerState>,
    Path(height): Path<u64>,
) -> Result<Json<ResendResponse>, ApiError> {
    let (height, dispatched) = state
        .dispatcher
        .resend_height(height)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no stored batch above height {height}")))?;
    info!(height, dispatched, "Operator resend");
    Ok(Json(ResendResponse { height, dispatched }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        relay::StatisticsLedger,
        scanner::EventDispatcher,
        state::RelayerState,
        store::MemoryStore,
        sync::{EventLogIngestor, EventLogStore, IngestionService},
        test_utils::{
            add_batch, bridge_batch, lock_log, sample_claim, store_batch, BRIDGE_BANK,
            TEST_PRIVATE_KEY,
        },
        types::{ClaimRequest, SyncCheckpoint},
    };
    use ethers::types::H256;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    struct Harness {
        state: ServerState,
        store: Arc<MemoryStore>,
        claim_rx: mpsc::Receiver<ClaimRequest>,
        cancel: CancellationToken,
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            self.cancel.cancel();
        }
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let ingestor = EventLogIngestor::load(store.clone(), SyncCheckpoint::default()).unwrap();
        let (service, ingest) = IngestionService::new(ingestor);
        let cancel = CancellationToken::new();
        tokio::spawn(service.run(cancel.clone()));

        let (claim_tx, claim_rx) = mpsc::channel(4);
        let state = ServerState {
            ingest,
            ledger: Arc::new(StatisticsLedger::load(store.clone()).unwrap()),
            relayer: Arc::new(RelayerState::restore(store.clone(), "ethereum").unwrap()),
            dispatcher: EventDispatcher::new(
                EventLogStore::new(store.clone()),
                claim_tx,
                BRIDGE_BANK.to_string(),
                8,
            )
            .unwrap(),
        };
        Harness {
            state,
            store,
            claim_rx,
            cancel,
        }
    }

    #[tokio::test]
    async fn push_acks_after_commit() {
        let h = harness();
        let body: PushBody = serde_json::from_value(serde_json::json!({
            "logs4EVMPerBlk": [add_batch(5, 1)]
        }))
        .unwrap();

        let reply = push_event_logs(State(h.state.clone()), Json(body)).await.unwrap();
        assert_eq!(reply, "ok");
        assert!(EventLogStore::new(h.store.clone()).batch_at(5).unwrap().is_some());
    }

    #[tokio::test]
    async fn push_failure_is_a_server_error() {
        let h = harness();
        h.store.set_fail_writes(true);
        let body = PushBody {
            logs: vec![add_batch(5, 1)],
        };

        let err = push_event_logs(State(h.state.clone()), Json(body)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn statistics_are_filtered() {
        let h = harness();
        for symbol in ["BTY", "USDT", "BTY"] {
            h.state
                .ledger
                .record_pending(&sample_claim(ClaimType::Lock, symbol, 1), H256::zero())
                .unwrap();
        }

        let query = StatisticsQuery {
            symbol: Some("BTY".to_string()),
            status: Some("pending".to_string()),
            ..Default::default()
        };
        let Json(records) = show_statistics(
            State(h.state.clone()),
            Path("lock".to_string()),
            Query(query),
        )
        .await
        .unwrap();
        let indices: Vec<_> = records.iter().map(|r| r.tx_index).collect();
        assert_eq!(indices, vec![1, 3]);

        let err = show_statistics(
            State(h.state.clone()),
            Path("withdraw".to_string()),
            Query(StatisticsQuery::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn token_queries() {
        let h = harness();
        let Json(tokens) = show_tokens(State(h.state.clone())).await;
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].symbol, "BTY");

        let err = show_token(State(h.state.clone()), Path("USDT".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn private_key_import_unlocks() {
        let h = harness();
        let err = import_private_key(
            State(h.state.clone()),
            Json(ImportKeyRequest {
                private_key: "zz".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let Json(response) = import_private_key(
            State(h.state.clone()),
            Json(ImportKeyRequest {
                private_key: TEST_PRIVATE_KEY.to_string(),
            }),
        )
        .await
        .unwrap();
        assert!(h.state.relayer.is_unlocked());
        assert_eq!(Some(response.address), h.state.relayer.address().await);

        let err = import_private_key(
            State(h.state.clone()),
            Json(ImportKeyRequest {
                private_key: "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d"
                    .to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
        assert_eq!(Some(response.address), h.state.relayer.address().await);
    }

    #[tokio::test]
    async fn resend_dispatches_stored_batch() {
        let mut h = harness();
        let log = lock_log(Address::repeat_byte(1), Address::repeat_byte(2), "BTY", 1, 1);
        store_batch(&h.store, &bridge_batch(9, 1, vec![log]));

        let Json(response) = resend_height(State(h.state.clone()), Path(8)).await.unwrap();
        assert_eq!(
            response,
            ResendResponse {
                height: 9,
                dispatched: 1
            }
        );
        assert!(h.claim_rx.try_recv().is_ok());

        let err = resend_height(State(h.state.clone()), Path(9)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
