//! Key layout. Numeric components are zero-padded so that byte order is
//! numeric order.

use crate::types::ClaimType;
use ethers::types::U256;

pub const EVM_LOG_BATCH_PREFIX: &str = "evmlogs-batch-";
pub const EVM_LOG_CHECKPOINT: &[u8] = b"evmlogs-checkpoint";
pub const SCANNER_LAST_HEIGHT: &[u8] = b"scanner-last-height";
pub const STATISTICS_TOTAL_TX: &[u8] = b"statistics-total-tx";
pub const TOKEN_ADDRESS_PREFIX: &str = "token-address-";
pub const BRIDGE_REGISTRY_ADDRESS: &[u8] = b"bridge-registry-address";
pub const RELAY_RETRY_PREFIX: &str = "relay-retry-";

const STATISTICS_PREFIX: &str = "statistics-";
const STATISTICS_CHECKPOINT_PREFIX: &str = "statistics-checkpoint-";

pub fn evm_log_batch(height: u64) -> Vec<u8> {
    format!("{EVM_LOG_BATCH_PREFIX}{height:020}").into_bytes()
}

pub fn statistic(claim_type: ClaimType, tx_index: u64) -> Vec<u8> {
    format!("{STATISTICS_PREFIX}{}-{tx_index:012}", claim_type.as_u8()).into_bytes()
}

pub fn statistics_prefix(claim_type: ClaimType) -> Vec<u8> {
    format!("{STATISTICS_PREFIX}{}-", claim_type.as_u8()).into_bytes()
}

pub fn statistics_checkpoint(claim_type: ClaimType) -> Vec<u8> {
    format!("{STATISTICS_CHECKPOINT_PREFIX}{}", claim_type.as_u8()).into_bytes()
}

pub fn token_address(symbol: &str) -> Vec<u8> {
    format!("{TOKEN_ADDRESS_PREFIX}{symbol}").into_bytes()
}

/// Retries sort by claim type, then nonce. The source tx hash keeps two
/// events with the same nonce apart.
pub fn relay_retry(claim_type: ClaimType, nonce: U256, source_tx_hash: &str) -> Vec<u8> {
    format!(
        "{RELAY_RETRY_PREFIX}{}-{:0>78}-{source_tx_hash}",
        claim_type.as_u8(),
        nonce.to_string()
    )
    .into_bytes()
}
