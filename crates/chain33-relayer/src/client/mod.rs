//! The relayer's view of the two chains. Everything above this module talks
//! to the traits so that tests can swap in-process fakes for the nodes.

mod chain33;
mod evm;

pub use chain33::{Chain33Client, PushSubscription};
pub use evm::{EvmDestination, EvmRegistry};

use crate::{
    error::ChainError,
    types::{Claim, ClaimType},
};
use async_trait::async_trait;
use ethers::types::{Address, H256};

/// Execution outcome of a destination-chain transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionResult {
    Success,
    Failed,
}

/// The chain33 node whose bridge-bank events are relayed.
#[async_trait]
pub trait SourceChain: Send + Sync {
    async fn current_height(&self) -> Result<u64, ChainError>;

    /// Registers (or re-registers) the push feed that delivers event-log batches.
    async fn subscribe_push(&self, subscription: &PushSubscription) -> Result<(), ChainError>;
}

/// The counterpart chain hosting the oracle and bridge-bank contracts.
#[async_trait]
pub trait DestinationChain: Send + Sync {
    fn chain_name(&self) -> &str;

    /// Submits `newOracleClaim` and returns the transaction hash without waiting for inclusion.
    async fn submit_claim(&self, claim: &Claim) -> Result<H256, ChainError>;

    /// `None` while no receipt is available.
    async fn execution_result(&self, tx_hash: H256) -> Result<Option<ExecutionResult>, ChainError>;

    /// Bridge-bank lookup of the token behind `symbol`; `None` when not created yet.
    async fn token_address(
        &self,
        claim_type: ClaimType,
        symbol: &str,
    ) -> Result<Option<Address>, ChainError>;

    /// `decimals()` of the ERC20 token at `token`.
    async fn token_decimals(&self, token: Address) -> Result<u8, ChainError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeContracts {
    pub oracle: Address,
    pub bridge_bank: Address,
}

/// Reads the canonical bridge contract addresses published by the registry.
#[async_trait]
pub trait ContractRegistry: Send + Sync {
    async fn bridge_contracts(&self, registry: Address) -> Result<BridgeContracts, ChainError>;
}
