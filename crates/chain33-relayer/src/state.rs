use crate::{
    error::{RelayError, StoreError},
    store::{keys, KeyValueStore, KeyValueStoreExt, ListDirection},
    types::{TokenAddressRecord, NATIVE_SYMBOL, NATIVE_TOKEN_ADDRESS},
};
use ethers::{
    signers::{LocalWallet, Signer},
    types::{Address, Bytes, H256},
    utils::hash_message,
};
use std::{collections::HashMap, str::FromStr, sync::Arc};
use tokio::sync::{watch, RwLock};
use tracing::info;

struct Inner {
    wallet: Option<LocalWallet>,
    token_addresses: HashMap<String, TokenAddressRecord>,
}

/// Key material and the token-address cache, shared by the scanner, the
/// relay engine and the operator surface.
///
/// The wallet is written once on import and read for every signature. The
/// token cache shares the same lock since it is written at most once per
/// symbol.
pub struct RelayerState {
    inner: RwLock<Inner>,
    unlocked_tx: watch::Sender<bool>,
    store: Arc<dyn KeyValueStore>,
    chain_name: String,
}

impl RelayerState {
    /// Restores the persisted token addresses. `chain_name` labels records
    /// resolved from now on.
    pub fn restore(store: Arc<dyn KeyValueStore>, chain_name: &str) -> Result<Self, StoreError> {
        let mut token_addresses = HashMap::new();
        token_addresses.insert(
            NATIVE_SYMBOL.to_string(),
            TokenAddressRecord {
                symbol: NATIVE_SYMBOL.to_string(),
                address: NATIVE_TOKEN_ADDRESS,
                chain_name: chain_name.to_string(),
                decimals: None,
            },
        );

        let records: Vec<TokenAddressRecord> = store.list_json(
            keys::TOKEN_ADDRESS_PREFIX.as_bytes(),
            None,
            0,
            ListDirection::Ascending,
        )?;
        for record in records {
            info!(symbol = %record.symbol, address = ?record.address, "Restored token address");
            token_addresses.insert(record.symbol.clone(), record);
        }

        let (unlocked_tx, _) = watch::channel(false);
        Ok(Self {
            inner: RwLock::new(Inner {
                wallet: None,
                token_addresses,
            }),
            unlocked_tx,
            store,
            chain_name: chain_name.to_string(),
        })
    }

    /// Installs the relayer key and releases everything waiting on [`Self::unlocked`].
    /// The key can be imported once per process.
    pub async fn import_private_key(&self, private_key: &str) -> Result<Address, RelayError> {
        let wallet = LocalWallet::from_str(private_key.trim())
            .map_err(|e| RelayError::InvalidKey(e.to_string()))?;
        let address = wallet.address();

        let mut inner = self.inner.write().await;
        if inner.wallet.is_some() {
            return Err(RelayError::AlreadyUnlocked);
        }
        inner.wallet = Some(wallet);
        drop(inner);
        self.unlocked_tx.send_replace(true);
        info!(?address, "Relayer key imported");
        Ok(address)
    }

    pub fn unlocked(&self) -> watch::Receiver<bool> {
        self.unlocked_tx.subscribe()
    }

    pub fn is_unlocked(&self) -> bool {
        *self.unlocked_tx.borrow()
    }

    pub async fn address(&self) -> Option<Address> {
        self.inner.read().await.wallet.as_ref().map(|w| w.address())
    }

    pub async fn wallet(&self) -> Option<LocalWallet> {
        self.inner.read().await.wallet.clone()
    }

    /// Signs `claim_id` as an Ethereum signed message (65 bytes, r ‖ s ‖ v).
    pub async fn sign_claim(&self, claim_id: H256) -> Result<Bytes, RelayError> {
        let inner = self.inner.read().await;
        let wallet = inner.wallet.as_ref().ok_or(RelayError::Locked)?;
        let signature = wallet
            .sign_hash(hash_message(claim_id))
            .map_err(|e| RelayError::Signing(e.to_string()))?;
        Ok(Bytes::from(signature.to_vec()))
    }

    pub async fn cached_token_address(&self, symbol: &str) -> Option<Address> {
        self.inner
            .read()
            .await
            .token_addresses
            .get(symbol)
            .map(|record| record.address)
    }

    /// Caches and persists a freshly resolved token.
    pub async fn set_token(
        &self,
        symbol: &str,
        address: Address,
        decimals: u8,
    ) -> Result<(), StoreError> {
        let record = TokenAddressRecord {
            symbol: symbol.to_string(),
            address,
            chain_name: self.chain_name.clone(),
            decimals: Some(decimals),
        };
        let mut inner = self.inner.write().await;
        self.store
            .set_json_sync(&keys::token_address(symbol), &record)?;
        inner.token_addresses.insert(symbol.to_string(), record);
        Ok(())
    }

    pub async fn token_address_record(&self, symbol: &str) -> Option<TokenAddressRecord> {
        self.inner.read().await.token_addresses.get(symbol).cloned()
    }

    pub async fn token_addresses(&self) -> Vec<TokenAddressRecord> {
        let inner = self.inner.read().await;
        let mut records: Vec<_> = inner.token_addresses.values().cloned().collect();
        records.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        records
    }
}
