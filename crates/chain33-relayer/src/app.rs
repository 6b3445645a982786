use crate::{
    client::{
        BridgeContracts, Chain33Client, ContractRegistry, DestinationChain, EvmDestination,
        EvmRegistry, PushSubscription, SourceChain,
    },
    config::RelayerConfig,
    error::{BootstrapError, ChainError, RelayerError},
    relay::{ClaimRelayEngine, RelaySettings, RetryQueue, StatisticsLedger, StatusReconciler},
    scanner::{EventDispatcher, HeightScanner, ScannerSettings},
    server::{self, ServerState},
    state::RelayerState,
    store::{keys, KeyValueStore, KeyValueStoreExt},
    sync::{EventLogIngestor, EventLogStore, IngestionService},
    types::SyncCheckpoint,
};
use ethers::types::Address;
use std::{str::FromStr, sync::Arc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

fn client_error(e: ChainError) -> BootstrapError {
    BootstrapError::InvalidConfig(e.to_string())
}

fn parse_address(field: &str, value: &str) -> Result<Address, BootstrapError> {
    Address::from_str(value)
        .map_err(|_| BootstrapError::InvalidConfig(format!("{field} is not an address: {value}")))
}

/// A bootstrapped relayer: storage restored, contracts resolved, clients built.
pub struct RelayerApp {
    config: RelayerConfig,
    store: Arc<dyn KeyValueStore>,
    state: Arc<RelayerState>,
    ledger: Arc<StatisticsLedger>,
    ingestor: EventLogIngestor,
    contracts: BridgeContracts,
    source: Arc<dyn SourceChain>,
    destination: Arc<dyn DestinationChain>,
}

impl RelayerApp {
    /// Builds the relayer against the configured chain33 node and EVM chain.
    #[instrument(skip_all, fields(destination = %config.destination.name))]
    pub async fn bootstrap(
        config: RelayerConfig,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, BootstrapError> {
        config.validate()?;
        info!("Initializing relayer application");

        let source = Arc::new(
            Chain33Client::new(config.chain33.rpc_url.clone(), config.rpc_timeout())
                .map_err(client_error)?,
        );
        let registry = EvmRegistry::new(&config.destination.rpc_url).map_err(client_error)?;

        let name = config.destination.name.clone();
        let rpc_url = config.destination.rpc_url.clone();
        let chain_id = config.destination.chain_id;
        Self::assemble(config, store, source, &registry, move |contracts, state| {
            let destination = EvmDestination::new(name, &rpc_url, chain_id, contracts, state)
                .map_err(client_error)?;
            Ok(Arc::new(destination) as Arc<dyn DestinationChain>)
        })
        .await
    }

    /// Bootstrap with caller-supplied chain clients.
    pub async fn assemble<F>(
        config: RelayerConfig,
        store: Arc<dyn KeyValueStore>,
        source: Arc<dyn SourceChain>,
        registry: &dyn ContractRegistry,
        make_destination: F,
    ) -> Result<Self, BootstrapError>
    where
        F: FnOnce(BridgeContracts, Arc<RelayerState>) -> Result<Arc<dyn DestinationChain>, BootstrapError>,
    {
        config.validate()?;

        EventLogStore::new(store.clone()).ensure_sentinel()?;
        let ingestor = EventLogIngestor::load(store.clone(), SyncCheckpoint::default())?;
        let ledger = Arc::new(StatisticsLedger::load(store.clone())?);
        let state = Arc::new(RelayerState::restore(
            store.clone(),
            &config.destination.name,
        )?);

        let contracts = resolve_bridge_contracts(&config, store.as_ref(), registry).await?;
        info!(
            oracle = ?contracts.oracle,
            bridge_bank = ?contracts.bridge_bank,
            "Resolved bridge contracts"
        );
        let destination = make_destination(contracts, state.clone())?;

        Ok(Self {
            config,
            store,
            state,
            ledger,
            ingestor,
            contracts,
            source,
            destination,
        })
    }

    pub fn state(&self) -> Arc<RelayerState> {
        self.state.clone()
    }

    pub fn ledger(&self) -> Arc<StatisticsLedger> {
        self.ledger.clone()
    }

    pub fn contracts(&self) -> BridgeContracts {
        self.contracts
    }

    /// Runs every task until one of them stops or `cancel` fires. A fatal
    /// scan error is returned.
    #[instrument(skip_all)]
    pub async fn run(self, cancel: CancellationToken) -> Result<(), RelayerError> {
        info!("Starting all relayer components");
        let checkpoint = self.ingestor.checkpoint();

        let (ingestion, ingest) = IngestionService::new(self.ingestor);
        let (claim_tx, claim_rx) = mpsc::channel(self.config.claim_channel_size);

        let dispatcher = EventDispatcher::new(
            EventLogStore::new(self.store.clone()),
            claim_tx,
            self.config.chain33.bridge_bank_address.clone(),
            self.config.precision.source_decimals,
        )?;
        let reconciler = StatusReconciler::new(self.ledger.clone(), self.destination.clone());
        let scanner = HeightScanner::new(
            self.source.clone(),
            self.store.clone(),
            dispatcher.clone(),
            reconciler,
            self.state.clone(),
            ScannerSettings {
                fetch_period: self.config.fetch_height_period(),
                maturity_depth: self.config.chain33.maturity_depth,
                start_height: self.config.chain33.start_height,
            },
        )?;
        let engine = ClaimRelayEngine::new(
            self.state.clone(),
            self.destination.clone(),
            self.ledger.clone(),
            RetryQueue::new(self.store.clone()),
            RelaySettings {
                native_decimals: self.config.precision.destination_decimals,
                retry_period: self.config.retry_period(),
                max_attempts: self.config.relay.max_attempts,
            },
            claim_rx,
        );
        let server_state = ServerState {
            ingest,
            ledger: self.ledger.clone(),
            relayer: self.state.clone(),
            dispatcher,
        };

        let push_listener = server::bind(self.config.server_addr).await?;
        let operator_listener = server::bind(self.config.operator_addr).await?;

        // Start components in separate tasks
        let mut ingestion_handle = tokio::spawn(ingestion.run(cancel.clone()));
        let mut relay_handle = tokio::spawn(engine.run(cancel.clone()));
        let mut scanner_handle = tokio::spawn(scanner.run(cancel.clone()));
        let mut server_handle = tokio::spawn(server::serve(
            push_listener,
            operator_listener,
            server_state,
            cancel.clone(),
        ));

        if let Some(push) = &self.config.chain33.push {
            let subscription = PushSubscription {
                name: push.name.clone(),
                callback_url: push.callback_url.clone(),
                last_sequence: checkpoint.last_sequence,
                last_height: checkpoint.last_height,
                contract: self.config.chain33.bridge_bank_address.clone(),
            };
            if let Err(e) = self.source.subscribe_push(&subscription).await {
                warn!(error = %e, "Push subscription failed, relying on an existing one");
            }
        }

        let result = tokio::select! {
            res = &mut scanner_handle => task_result("height scanner", res),
            res = &mut server_handle => task_result("http server", res),
            res = &mut ingestion_handle => task_result("ingestion", res.map(Ok)),
            res = &mut relay_handle => task_result("claim relay", res.map(Ok)),
        };

        cancel.cancel();
        for handle in [ingestion_handle, relay_handle] {
            if !handle.is_finished() {
                let _ = handle.await;
            }
        }
        result
    }
}

fn task_result(
    task: &'static str,
    res: Result<Result<(), RelayerError>, tokio::task::JoinError>,
) -> Result<(), RelayerError> {
    match res {
        Ok(Ok(())) => {
            info!(task, "Task exited");
            Ok(())
        }
        Ok(Err(e)) => {
            error!(task, error = %e, "Task failed");
            Err(e)
        }
        Err(e) => {
            error!(task, error = %e, "Task panicked or was aborted");
            Err(RelayerError::TaskFailed {
                task,
                message: e.to_string(),
            })
        }
    }
}

/// Configured addresses win; otherwise the registry (configured, or the one
/// persisted by an earlier run) is asked for `oracle()` and `bridgeBank()`.
pub async fn resolve_bridge_contracts(
    config: &RelayerConfig,
    store: &dyn KeyValueStore,
    registry: &dyn ContractRegistry,
) -> Result<BridgeContracts, BootstrapError> {
    let destination = &config.destination;
    if let (Some(oracle), Some(bridge_bank)) =
        (&destination.oracle_address, &destination.bridge_bank_address)
    {
        return Ok(BridgeContracts {
            oracle: parse_address("destination.oracleAddress", oracle)?,
            bridge_bank: parse_address("destination.bridgeBankAddress", bridge_bank)?,
        });
    }

    let registry_address = match &destination.registry_address {
        Some(address) => address.clone(),
        None => store
            .get_json::<String>(keys::BRIDGE_REGISTRY_ADDRESS)?
            .ok_or_else(|| {
                BootstrapError::NotRegistered("no bridge registry address configured or stored".to_string())
            })?,
    };
    let registry_addr = parse_address("destination.registryAddress", &registry_address)?;

    let contracts = registry
        .bridge_contracts(registry_addr)
        .await
        .map_err(|source| BootstrapError::Registry {
            registry: registry_address.clone(),
            source,
        })?;
    if contracts.oracle.is_zero() {
        return Err(BootstrapError::NotRegistered(format!(
            "oracle is not set in registry {registry_address}"
        )));
    }
    if contracts.bridge_bank.is_zero() {
        return Err(BootstrapError::NotRegistered(format!(
            "bridgeBank is not set in registry {registry_address}"
        )));
    }

    store.set_json_sync(keys::BRIDGE_REGISTRY_ADDRESS, &registry_address)?;
    Ok(contracts)
}
