//! Node push callback plus the operator routes. The two are served on
//! separate listeners so that only `/push` has to be reachable by the node.

mod handlers;

use crate::{
    error::RelayerError, relay::StatisticsLedger, scanner::EventDispatcher,
    state::RelayerState, sync::IngestHandle,
};
use axum::{
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const HEALTH_PATH: &str = "/health";
pub const PUSH_PATH: &str = "/push";
pub const STATISTICS_PATH: &str = "/statistics/:claim_type";
pub const TOKENS_PATH: &str = "/tokens";
pub const TOKEN_PATH: &str = "/tokens/:symbol";
pub const PRIVATE_KEY_PATH: &str = "/private_key";
pub const RESEND_PATH: &str = "/resend/:height";

#[derive(Clone)]
pub struct ServerState {
    pub ingest: IngestHandle,
    pub ledger: Arc<StatisticsLedger>,
    pub relayer: Arc<RelayerState>,
    pub dispatcher: EventDispatcher,
}

pub fn make_push_router(state: ServerState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(handlers::health_check))
        .route(PUSH_PATH, post(handlers::push_event_logs))
        .with_state(state)
}

pub fn make_operator_router(state: ServerState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(handlers::health_check))
        .route(STATISTICS_PATH, get(handlers::show_statistics))
        .route(TOKENS_PATH, get(handlers::show_tokens))
        .route(TOKEN_PATH, get(handlers::show_token))
        .route(PRIVATE_KEY_PATH, post(handlers::import_private_key))
        .route(RESEND_PATH, post(handlers::resend_height))
        .with_state(state)
}

pub async fn bind(addr: SocketAddr) -> Result<TcpListener, RelayerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| RelayerError::Server(format!("failed to bind {addr}: {e}")))
}

async fn serve_router(
    name: &'static str,
    listener: TcpListener,
    router: Router,
    cancel: CancellationToken,
) -> Result<(), RelayerError> {
    let addr = listener
        .local_addr()
        .map_err(|e| RelayerError::Server(e.to_string()))?;
    info!(%addr, listener = name, "Relayer HTTP server listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| RelayerError::Server(format!("{name} listener: {e}")))
}

/// Serves both listeners until `cancel` fires or one of them fails.
pub async fn serve(
    push: TcpListener,
    operator: TcpListener,
    state: ServerState,
    cancel: CancellationToken,
) -> Result<(), RelayerError> {
    let push_server = serve_router("push", push, make_push_router(state.clone()), cancel.clone());
    let operator_server =
        serve_router("operator", operator, make_operator_router(state), cancel.clone());

    tokio::try_join!(push_server, operator_server)?;
    Ok(())
}
