use crate::{
    client::{
        BridgeContracts, ContractRegistry, DestinationChain, ExecutionResult, PushSubscription,
        SourceChain,
    },
    decoder::EventDecoder,
    error::ChainError,
    store::{keys, KeyValueStoreExt, MemoryStore},
    types::{
        AddDelType, Claim, ClaimRequest, ClaimType, EventLogBatch, EvmLog, EvmTx, TxAndLogs,
    },
};
use async_trait::async_trait;
use ethers::{
    abi::{self, Token},
    types::{Address, Bytes, H256, U256},
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Mutex,
    },
};

pub const TEST_PRIVATE_KEY: &str =
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub const BRIDGE_BANK: &str = "0x8afdadfc88a1087c9a1d6c0f5dd04634b87f303a";

pub fn add_batch(height: u64, seq: i64) -> EventLogBatch {
    EventLogBatch {
        height,
        seq_num: seq,
        add_del_type: AddDelType::Add as i32,
        tx_and_logs: Vec::new(),
    }
}

pub fn del_batch(height: u64, seq: i64) -> EventLogBatch {
    EventLogBatch {
        add_del_type: AddDelType::Del as i32,
        ..add_batch(height, seq)
    }
}

/// A batch with one bridge-bank transaction carrying `logs`.
pub fn bridge_batch(height: u64, seq: i64, logs: Vec<EvmLog>) -> EventLogBatch {
    EventLogBatch {
        tx_and_logs: vec![TxAndLogs {
            tx: EvmTx {
                hash: H256::from_low_u64_be(height),
                execer: "user.p.para.evm".to_string(),
                // the node may report the address in any case
                contract_addr: BRIDGE_BANK.to_ascii_uppercase().replacen("0X", "0x", 1),
            },
            logs,
        }],
        ..add_batch(height, seq)
    }
}

pub fn store_batch(store: &MemoryStore, batch: &EventLogBatch) {
    store
        .set_json_sync(&keys::evm_log_batch(batch.height), batch)
        .unwrap();
}

pub fn lock_log_data(
    from: Address,
    receiver: Address,
    symbol: &str,
    value: U256,
    nonce: U256,
) -> Vec<u8> {
    abi::encode(&[
        Token::Address(from),
        Token::Bytes(receiver.as_bytes().to_vec()),
        Token::Address(Address::zero()),
        Token::String(symbol.to_string()),
        Token::Uint(value),
        Token::Uint(nonce),
    ])
}

pub fn burn_log_data(
    owner: Address,
    receiver: Address,
    symbol: &str,
    amount: U256,
    nonce: U256,
) -> Vec<u8> {
    abi::encode(&[
        Token::Address(Address::repeat_byte(0xaa)),
        Token::String(symbol.to_string()),
        Token::Uint(amount),
        Token::Address(owner),
        Token::Bytes(receiver.as_bytes().to_vec()),
        Token::Uint(nonce),
    ])
}

pub fn lock_log(from: Address, receiver: Address, symbol: &str, value: u64, nonce: u64) -> EvmLog {
    EvmLog {
        topics: vec![EventDecoder::new().unwrap().lock_signature()],
        data: lock_log_data(from, receiver, symbol, value.into(), nonce.into()).into(),
    }
}

pub fn burn_log(owner: Address, receiver: Address, symbol: &str, amount: u64, nonce: u64) -> EvmLog {
    EvmLog {
        topics: vec![EventDecoder::new().unwrap().burn_signature()],
        data: burn_log_data(owner, receiver, symbol, amount.into(), nonce.into()).into(),
    }
}

pub fn sample_request(claim_type: ClaimType, symbol: &str, amount: u64, nonce: u64) -> ClaimRequest {
    ClaimRequest {
        claim_type,
        sender: format!("{:?}", Address::repeat_byte(0x11)),
        receiver: format!("{:?}", Address::repeat_byte(0x22)),
        symbol: symbol.to_string(),
        amount: amount.into(),
        nonce: nonce.into(),
        decimals: 8,
        source_tx_hash: format!("{:?}", H256::from_low_u64_be(nonce)),
    }
}

pub fn sample_claim(claim_type: ClaimType, symbol: &str, nonce: u64) -> Claim {
    let request = sample_request(claim_type, symbol, 100, nonce);
    Claim {
        claim_type,
        sender: request.sender,
        receiver: request.receiver,
        token_address: Address::zero(),
        symbol: request.symbol,
        amount: request.amount,
        nonce: request.nonce,
        claim_id: H256::from_low_u64_be(nonce),
        signature: Bytes::from(vec![0u8; 65]),
        source_tx_hash: request.source_tx_hash,
    }
}

pub struct MockSourceChain {
    height: AtomicU64,
    fail_subscribe: AtomicBool,
    subscriptions: Mutex<Vec<PushSubscription>>,
}

impl MockSourceChain {
    pub fn new(height: u64) -> Self {
        Self {
            height: AtomicU64::new(height),
            fail_subscribe: AtomicBool::new(false),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn subscriptions(&self) -> Vec<PushSubscription> {
        self.subscriptions.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceChain for MockSourceChain {
    async fn current_height(&self) -> Result<u64, ChainError> {
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn subscribe_push(&self, subscription: &PushSubscription) -> Result<(), ChainError> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(ChainError::Node {
                method: "Chain33.AddPushSubscribe".to_string(),
                message: "subscription already exists".to_string(),
            });
        }
        self.subscriptions.lock().unwrap().push(subscription.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MockDestination {
    submitted: Mutex<Vec<Claim>>,
    results: Mutex<HashMap<H256, ExecutionResult>>,
    queried: Mutex<Vec<H256>>,
    tokens: Mutex<HashMap<(ClaimType, String), Address>>,
    decimals: Mutex<HashMap<Address, u8>>,
    token_queries: AtomicU64,
    decimals_queries: AtomicU64,
    fail_submissions: AtomicBool,
    fail_queries: AtomicBool,
}

impl MockDestination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> Vec<Claim> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn fail_submissions(&self, fail: bool) {
        self.fail_submissions.store(fail, Ordering::SeqCst);
    }

    pub fn set_result(&self, tx_hash: H256, result: ExecutionResult) {
        self.results.lock().unwrap().insert(tx_hash, result);
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn queried(&self) -> Vec<H256> {
        self.queried.lock().unwrap().clone()
    }

    pub fn clear_queries(&self) {
        self.queried.lock().unwrap().clear();
    }

    pub fn set_token(&self, claim_type: ClaimType, symbol: &str, address: Address, decimals: u8) {
        self.tokens
            .lock()
            .unwrap()
            .insert((claim_type, symbol.to_string()), address);
        self.decimals.lock().unwrap().insert(address, decimals);
    }

    pub fn token_queries(&self) -> u64 {
        self.token_queries.load(Ordering::SeqCst)
    }

    pub fn decimals_queries(&self) -> u64 {
        self.decimals_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DestinationChain for MockDestination {
    fn chain_name(&self) -> &str {
        "ethereum"
    }

    async fn submit_claim(&self, claim: &Claim) -> Result<H256, ChainError> {
        if self.fail_submissions.load(Ordering::SeqCst) {
            return Err(ChainError::Contract("execution reverted".to_string()));
        }
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(claim.clone());
        Ok(H256::from_low_u64_be(0x1000 + submitted.len() as u64))
    }

    async fn execution_result(&self, tx_hash: H256) -> Result<Option<ExecutionResult>, ChainError> {
        self.queried.lock().unwrap().push(tx_hash);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(ChainError::Provider("connection refused".to_string()));
        }
        Ok(self.results.lock().unwrap().get(&tx_hash).copied())
    }

    async fn token_address(
        &self,
        claim_type: ClaimType,
        symbol: &str,
    ) -> Result<Option<Address>, ChainError> {
        self.token_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .tokens
            .lock()
            .unwrap()
            .get(&(claim_type, symbol.to_string()))
            .copied())
    }

    async fn token_decimals(&self, token: Address) -> Result<u8, ChainError> {
        self.decimals_queries.fetch_add(1, Ordering::SeqCst);
        self.decimals
            .lock()
            .unwrap()
            .get(&token)
            .copied()
            .ok_or_else(|| ChainError::Contract(format!("no token at {token:?}")))
    }
}

pub struct MockRegistry {
    contracts: BridgeContracts,
    queried: Mutex<Vec<Address>>,
}

impl MockRegistry {
    pub fn new(contracts: BridgeContracts) -> Self {
        Self {
            contracts,
            queried: Mutex::new(Vec::new()),
        }
    }

    pub fn queried(&self) -> Vec<Address> {
        self.queried.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContractRegistry for MockRegistry {
    async fn bridge_contracts(&self, registry: Address) -> Result<BridgeContracts, ChainError> {
        self.queried.lock().unwrap().push(registry);
        Ok(self.contracts)
    }
}
