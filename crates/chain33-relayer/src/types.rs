use ethers::{
    types::{Address, Bytes, H160, H256, U256},
    utils::hex,
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Symbol of the chain33 native coin. Its destination address is fixed and never queried.
pub const NATIVE_SYMBOL: &str = "BTY";
pub const NATIVE_TOKEN_ADDRESS: Address = H160([0u8; 20]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimType {
    Burn = 1,
    Lock = 2,
}

impl ClaimType {
    pub const ALL: [ClaimType; 2] = [ClaimType::Burn, ClaimType::Lock];

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ClaimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimType::Burn => write!(f, "burn"),
            ClaimType::Lock => write!(f, "lock"),
        }
    }
}

impl FromStr for ClaimType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "burn" | "1" => Ok(ClaimType::Burn),
            "lock" | "2" => Ok(ClaimType::Lock),
            other => Err(format!("unknown claim type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Success,
    Failed,
}

impl TxStatus {
    pub fn is_final(self) -> bool {
        !matches!(self, TxStatus::Pending)
    }
}

impl FromStr for TxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(TxStatus::Pending),
            "success" => Ok(TxStatus::Success),
            "failed" => Ok(TxStatus::Failed),
            other => Err(format!("unknown tx status: {other}")),
        }
    }
}

/// Marker carried by every pushed record: a new block or the unwind of a reorged one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddDelType {
    Add = 1,
    Del = 2,
}

impl TryFrom<i32> for AddDelType {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(AddDelType::Add),
            2 => Ok(AddDelType::Del),
            other => Err(other),
        }
    }
}

/// Ingestion progress, persisted together with every accepted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCheckpoint {
    pub last_sequence: i64,
    pub last_height: u64,
}

impl Default for SyncCheckpoint {
    fn default() -> Self {
        Self {
            last_sequence: -1,
            last_height: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmTx {
    pub hash: H256,
    pub execer: String,
    pub contract_addr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmLog {
    #[serde(alias = "topic")]
    pub topics: Vec<H256>,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxAndLogs {
    pub tx: EvmTx,
    #[serde(default)]
    pub logs: Vec<EvmLog>,
}

/// One height's worth of EVM logs pushed by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLogBatch {
    pub height: u64,
    pub seq_num: i64,
    pub add_del_type: i32,
    #[serde(default)]
    pub tx_and_logs: Vec<TxAndLogs>,
}

impl EventLogBatch {
    pub fn sentinel() -> Self {
        Self {
            height: 0,
            seq_num: -1,
            add_del_type: AddDelType::Add as i32,
            tx_and_logs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockEvent {
    pub from: Address,
    pub to: Bytes,
    pub token: Address,
    pub symbol: String,
    pub value: U256,
    pub nonce: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurnEvent {
    pub token: Address,
    pub symbol: String,
    pub amount: U256,
    pub owner_from: Address,
    pub ethereum_receiver: Bytes,
    pub nonce: U256,
}

/// A decoded bridge-bank event, amount still in source-chain precision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    Lock(LockEvent),
    Burn(BurnEvent),
}

impl DomainEvent {
    pub fn claim_type(&self) -> ClaimType {
        match self {
            DomainEvent::Lock(_) => ClaimType::Lock,
            DomainEvent::Burn(_) => ClaimType::Burn,
        }
    }

    pub fn into_claim_request(self, source_tx_hash: H256, decimals: u8) -> ClaimRequest {
        let source_tx_hash = format!("{source_tx_hash:?}");
        match self {
            DomainEvent::Lock(event) => ClaimRequest {
                claim_type: ClaimType::Lock,
                sender: format!("{:?}", event.from),
                receiver: to_hex(&event.to),
                symbol: event.symbol,
                amount: event.value,
                nonce: event.nonce,
                decimals,
                source_tx_hash,
            },
            DomainEvent::Burn(event) => ClaimRequest {
                claim_type: ClaimType::Burn,
                sender: format!("{:?}", event.owner_from),
                receiver: to_hex(&event.ethereum_receiver),
                symbol: event.symbol,
                amount: event.amount,
                nonce: event.nonce,
                decimals,
                source_tx_hash,
            },
        }
    }
}

/// Unsigned claim content handed to the relay engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    pub claim_type: ClaimType,
    pub sender: String,
    pub receiver: String,
    pub symbol: String,
    pub amount: U256,
    pub nonce: U256,
    /// Precision of `amount` on the chain the event came from.
    pub decimals: u8,
    pub source_tx_hash: String,
}

/// A signed claim ready for the oracle contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub claim_type: ClaimType,
    pub sender: String,
    pub receiver: String,
    pub token_address: Address,
    pub symbol: String,
    /// Destination-chain precision.
    pub amount: U256,
    pub nonce: U256,
    pub claim_id: H256,
    pub signature: Bytes,
    pub source_tx_hash: String,
}

/// Audit record of one submitted claim, keyed by `(claim_type, tx_index)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatistic {
    pub tx_index: u64,
    pub claim_type: ClaimType,
    pub status: TxStatus,
    pub source_tx_hash: String,
    pub dest_tx_hash: H256,
    pub sender: String,
    pub receiver: String,
    pub symbol: String,
    pub amount: U256,
    pub nonce: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAddressRecord {
    pub symbol: String,
    pub address: Address,
    pub chain_name: String,
    /// Decimals of the destination token. Unset for the native coin, whose
    /// precision comes from configuration.
    #[serde(default)]
    pub decimals: Option<u8>,
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}
