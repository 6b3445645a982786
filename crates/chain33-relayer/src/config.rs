use crate::error::BootstrapError;
use anyhow::{Context, Result};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, str::FromStr, time::Duration};

fn default_fetch_height_period_ms() -> u64 {
    5_000
}

fn default_maturity_depth() -> u64 {
    10
}

fn default_rpc_timeout_ms() -> u64 {
    10_000
}

fn default_source_decimals() -> u8 {
    8
}

fn default_destination_decimals() -> u8 {
    18
}

fn default_claim_channel_size() -> usize {
    100
}

fn default_push_name() -> String {
    "chain33-relayer".to_string()
}

fn default_retry_period_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    10
}

fn default_operator_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9091))
}

// Config structures
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Chain33Config {
    pub rpc_url: String,
    pub bridge_bank_address: String,
    #[serde(default = "default_fetch_height_period_ms")]
    pub fetch_height_period_ms: u64,
    #[serde(default = "default_maturity_depth")]
    pub maturity_depth: u64,
    /// Height to start scanning from on a fresh database.
    #[serde(default)]
    pub start_height: u64,
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    #[serde(default)]
    pub push: Option<PushConfig>,
}

/// Registration of the node-side push feed. The callback must reach this
/// relayer's `/push` route.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PushConfig {
    #[serde(default = "default_push_name")]
    pub name: String,
    pub callback_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DestinationConfig {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    pub registry_address: Option<String>,
    pub oracle_address: Option<String>,
    pub bridge_bank_address: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PrecisionConfig {
    #[serde(default = "default_source_decimals")]
    pub source_decimals: u8,
    /// Native coin decimals on the destination. Other tokens report their own.
    #[serde(default = "default_destination_decimals")]
    pub destination_decimals: u8,
}

/// Retrying of claims whose relay failed.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    #[serde(default = "default_retry_period_ms")]
    pub retry_period_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            retry_period_ms: default_retry_period_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for PrecisionConfig {
    fn default() -> Self {
        Self {
            source_decimals: default_source_decimals(),
            destination_decimals: default_destination_decimals(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RelayerConfig {
    pub chain33: Chain33Config,
    pub destination: DestinationConfig,
    #[serde(default)]
    pub precision: PrecisionConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    pub db_path: String,
    /// Serves the node's push callback.
    pub server_addr: SocketAddr,
    /// Serves the operator routes (key import, resend, queries).
    #[serde(default = "default_operator_addr")]
    pub operator_addr: SocketAddr,
    #[serde(default = "default_claim_channel_size")]
    pub claim_channel_size: usize,
}

impl RelayerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn fetch_height_period(&self) -> Duration {
        Duration::from_millis(self.chain33.fetch_height_period_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.chain33.rpc_timeout_ms)
    }

    pub fn retry_period(&self) -> Duration {
        Duration::from_millis(self.relay.retry_period_ms)
    }

    pub fn validate(&self) -> Result<(), BootstrapError> {
        let invalid = |msg: String| Err(BootstrapError::InvalidConfig(msg));

        if self.chain33.rpc_url.is_empty() {
            return invalid("chain33.rpcUrl is empty".to_string());
        }
        if self.chain33.bridge_bank_address.is_empty() {
            return invalid("chain33.bridgeBankAddress is empty".to_string());
        }
        if self.chain33.fetch_height_period_ms == 0 {
            return invalid("chain33.fetchHeightPeriodMs must be positive".to_string());
        }
        if self.destination.rpc_url.is_empty() {
            return invalid("destination.rpcUrl is empty".to_string());
        }
        if self.claim_channel_size == 0 {
            return invalid("claimChannelSize must be positive".to_string());
        }
        if self.db_path.is_empty() {
            return invalid("dbPath is empty".to_string());
        }
        if self.relay.retry_period_ms == 0 || self.relay.max_attempts == 0 {
            return invalid("relay.retryPeriodMs and relay.maxAttempts must be positive".to_string());
        }
        if self.server_addr == self.operator_addr && self.server_addr.port() != 0 {
            return invalid(format!(
                "operatorAddr must differ from serverAddr {}",
                self.server_addr
            ));
        }

        for (field, value) in [
            ("destination.registryAddress", &self.destination.registry_address),
            ("destination.oracleAddress", &self.destination.oracle_address),
            ("destination.bridgeBankAddress", &self.destination.bridge_bank_address),
        ] {
            if let Some(value) = value {
                if Address::from_str(value).is_err() {
                    return invalid(format!("{field} is not an address: {value}"));
                }
            }
        }
        if self.destination.oracle_address.is_some() != self.destination.bridge_bank_address.is_some() {
            return invalid(
                "destination.oracleAddress and destination.bridgeBankAddress must be set together"
                    .to_string(),
            );
        }

        Ok(())
    }
}
