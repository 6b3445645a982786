use super::{BridgeContracts, ContractRegistry, DestinationChain, ExecutionResult};
use crate::{
    error::ChainError,
    state::RelayerState,
    types::{Claim, ClaimType},
};
use async_trait::async_trait;
use ethers::{
    abi::{self, Abi},
    prelude::*,
    providers::{Http, Provider},
    signers::Signer,
};
use std::{str::FromStr, sync::Arc};
use tracing::{debug, info, instrument};

const ORACLE_ABI: &[&str] = &["function newOracleClaim(uint8 _claimType, bytes _chain33Sender, address _ethereumReceiver, address _tokenAddress, string _symbol, uint256 _amount, bytes32 _claimID, bytes _signature) external"];

const BRIDGE_BANK_ABI: &[&str] = &[
    "function getBridgeToken2address(string _symbol) external view returns (address)",
    "function getLockedTokenAddress(string _symbol) external view returns (address)",
];

const ERC20_ABI: &[&str] = &["function decimals() external view returns (uint8)"];

const REGISTRY_ABI: &[&str] = &[
    "function oracle() external view returns (address)",
    "function bridgeBank() external view returns (address)",
];

fn connect(rpc_url: &str) -> Result<Arc<Provider<Http>>, ChainError> {
    let provider = Provider::<Http>::try_from(rpc_url)
        .map_err(|e| ChainError::Provider(format!("{rpc_url}: {e}")))?;
    Ok(Arc::new(provider))
}

fn parse(signatures: &[&str]) -> Result<Abi, ChainError> {
    abi::parse_abi(signatures).map_err(|e| ChainError::Contract(e.to_string()))
}

fn contract_error(e: impl std::fmt::Display) -> ChainError {
    ChainError::Contract(e.to_string())
}

/// The EVM chain hosting the oracle and bridge-bank contracts.
pub struct EvmDestination {
    name: String,
    chain_id: u64,
    provider: Arc<Provider<Http>>,
    contracts: BridgeContracts,
    state: Arc<RelayerState>,
    oracle_abi: Abi,
    bridge_bank_abi: Abi,
    erc20_abi: Abi,
}

impl EvmDestination {
    pub fn new(
        name: String,
        rpc_url: &str,
        chain_id: u64,
        contracts: BridgeContracts,
        state: Arc<RelayerState>,
    ) -> Result<Self, ChainError> {
        Ok(Self {
            name,
            chain_id,
            provider: connect(rpc_url)?,
            contracts,
            state,
            oracle_abi: parse(ORACLE_ABI)?,
            bridge_bank_abi: parse(BRIDGE_BANK_ABI)?,
            erc20_abi: parse(ERC20_ABI)?,
        })
    }
}

#[async_trait]
impl DestinationChain for EvmDestination {
    fn chain_name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, claim), fields(
        chain = %self.name,
        claim_type = %claim.claim_type,
        symbol = %claim.symbol,
        nonce = %claim.nonce
    ))]
    async fn submit_claim(&self, claim: &Claim) -> Result<H256, ChainError> {
        let wallet = self
            .state
            .wallet()
            .await
            .ok_or(ChainError::Locked)?
            .with_chain_id(self.chain_id);
        let client = Arc::new(SignerMiddleware::new(self.provider.clone(), wallet));

        let receiver = Address::from_str(&claim.receiver)
            .map_err(|e| ChainError::Contract(format!("invalid receiver {}: {e}", claim.receiver)))?;

        let oracle = Contract::new(self.contracts.oracle, self.oracle_abi.clone(), client);
        let call = oracle
            .method::<_, ()>(
                "newOracleClaim",
                (
                    claim.claim_type.as_u8(),
                    Bytes::from(claim.sender.as_bytes().to_vec()),
                    receiver,
                    claim.token_address,
                    claim.symbol.clone(),
                    claim.amount,
                    claim.claim_id.to_fixed_bytes(),
                    claim.signature.clone(),
                ),
            )
            .map_err(contract_error)?;

        let tx_hash = call.send().await.map_err(contract_error)?.tx_hash();
        info!(?tx_hash, "newOracleClaim sent");
        Ok(tx_hash)
    }

    async fn execution_result(&self, tx_hash: H256) -> Result<Option<ExecutionResult>, ChainError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| ChainError::Provider(e.to_string()))?;

        Ok(receipt.map(|receipt| {
            debug!(?tx_hash, status = ?receipt.status, "Fetched receipt");
            if receipt.status == Some(U64::one()) {
                ExecutionResult::Success
            } else {
                ExecutionResult::Failed
            }
        }))
    }

    async fn token_address(
        &self,
        claim_type: ClaimType,
        symbol: &str,
    ) -> Result<Option<Address>, ChainError> {
        let method = match claim_type {
            ClaimType::Lock => "getBridgeToken2address",
            ClaimType::Burn => "getLockedTokenAddress",
        };
        let bridge_bank = Contract::new(
            self.contracts.bridge_bank,
            self.bridge_bank_abi.clone(),
            self.provider.clone(),
        );
        let address: Address = bridge_bank
            .method::<_, Address>(method, symbol.to_string())
            .map_err(contract_error)?
            .call()
            .await
            .map_err(contract_error)?;

        Ok((!address.is_zero()).then_some(address))
    }

    async fn token_decimals(&self, token: Address) -> Result<u8, ChainError> {
        Contract::new(token, self.erc20_abi.clone(), self.provider.clone())
            .method::<_, u8>("decimals", ())
            .map_err(contract_error)?
            .call()
            .await
            .map_err(contract_error)
    }
}

/// Reads `oracle()` and `bridgeBank()` from the bridge registry.
pub struct EvmRegistry {
    provider: Arc<Provider<Http>>,
    abi: Abi,
}

impl EvmRegistry {
    pub fn new(rpc_url: &str) -> Result<Self, ChainError> {
        Ok(Self {
            provider: connect(rpc_url)?,
            abi: parse(REGISTRY_ABI)?,
        })
    }

    async fn view(&self, registry: Address, method: &str) -> Result<Address, ChainError> {
        Contract::new(registry, self.abi.clone(), self.provider.clone())
            .method::<_, Address>(method, ())
            .map_err(contract_error)?
            .call()
            .await
            .map_err(contract_error)
    }
}

#[async_trait]
impl ContractRegistry for EvmRegistry {
    #[instrument(skip(self))]
    async fn bridge_contracts(&self, registry: Address) -> Result<BridgeContracts, ChainError> {
        let oracle = self.view(registry, "oracle").await?;
        let bridge_bank = self.view(registry, "bridgeBank").await?;
        Ok(BridgeContracts {
            oracle,
            bridge_bank,
        })
    }
}
