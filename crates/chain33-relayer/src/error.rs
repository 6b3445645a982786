use ethers::types::H256;
use thiserror::Error;

use crate::types::ClaimType;

/// Failures of the persistent key-value layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Failed to encode or decode stored value: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Failures returned to the push source through the ingestion ack.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to persist event log batch: {0}")]
    Store(#[from] StoreError),

    #[error("Ingestion service is not running")]
    ServiceClosed,
}

/// Errors unpacking a bridge-bank log that matched a known event signature.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid bridge bank event layout: {0}")]
    Layout(String),

    #[error("Unknown event signature {0:?}")]
    UnknownSignature(H256),

    #[error("Failed to unpack {event} log data: {source}")]
    Abi {
        event: &'static str,
        #[source]
        source: ethers::abi::Error,
    },

    #[error("Unexpected value for field {field} of {event}")]
    UnexpectedToken {
        event: &'static str,
        field: &'static str,
    },
}

/// RPC-level failures talking to either chain. Always treated as transient.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("RPC request to {endpoint} failed: {message}")]
    Rpc { endpoint: String, message: String },

    #[error("Node returned an error for {method}: {message}")]
    Node { method: String, message: String },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Contract call failed: {0}")]
    Contract(String),

    #[error("Relayer key is not unlocked")]
    Locked,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Relayer key is not unlocked")]
    Locked,

    #[error("Relayer key is already imported")]
    AlreadyUnlocked,

    #[error("Invalid relayer private key: {0}")]
    InvalidKey(String),

    #[error("Failed to sign claim: {0}")]
    Signing(String),

    #[error("No token address registered for symbol {symbol} ({claim_type})")]
    TokenNotFound {
        symbol: String,
        claim_type: ClaimType,
    },

    #[error("Token lookup for {symbol} failed: {source}")]
    TokenLookup {
        symbol: String,
        #[source]
        source: ChainError,
    },

    #[error("Amount overflow while scaling {amount} by 10^{shift}")]
    AmountOverflow { amount: String, shift: u32 },

    #[error("Invalid claim field {field}: {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("Claim submission failed: {0}")]
    Submission(#[source] ChainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RelayError {
    /// Whether a later attempt at the same claim can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelayError::Locked
                | RelayError::TokenNotFound { .. }
                | RelayError::TokenLookup { .. }
                | RelayError::Submission(_)
                | RelayError::Store(_)
        )
    }
}

/// Typed fatal results of [`crate::RelayerApp::bootstrap`].
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Bridge contracts are not registered: {0}")]
    NotRegistered(String),

    #[error("Failed to resolve contracts from registry {registry}: {source}")]
    Registry {
        registry: String,
        #[source]
        source: ChainError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors that end one of the relayer's long-running tasks.
#[derive(Debug, Error)]
pub enum RelayerError {
    #[error("Corrupted bridge event in tx {tx_hash:?} at height {height}: {source}")]
    CorruptEvent {
        height: u64,
        tx_hash: H256,
        #[source]
        source: DecodeError,
    },

    #[error("Storage failure: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Decoder(#[from] DecodeError),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Task {task} failed: {message}")]
    TaskFailed { task: &'static str, message: String },
}
