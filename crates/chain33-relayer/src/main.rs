use anyhow::{Context, Result};
use chain33_relayer::{store::KeyValueStore, RelayerApp, RelayerConfig};
use clap::Parser;
use std::{path::PathBuf, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "chain33-relayer", about = "Relays chain33 bridge-bank events to an EVM chain")]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "relayer.json")]
    config: PathBuf,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Relayer private key; the key can also be imported later over HTTP
    #[arg(long, env = "RELAYER_PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(feature = "rocksdb")]
fn open_store(config: &RelayerConfig) -> Result<Arc<dyn KeyValueStore>> {
    let store = chain33_relayer::store::RocksDbStore::open(std::path::Path::new(&config.db_path))
        .with_context(|| format!("Failed to open database at {}", config.db_path))?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "rocksdb"))]
fn open_store(config: &RelayerConfig) -> Result<Arc<dyn KeyValueStore>> {
    tracing::warn!(
        db_path = %config.db_path,
        "Built without the rocksdb feature, state is kept in memory only"
    );
    Ok(Arc::new(chain33_relayer::store::MemoryStore::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = RelayerConfig::from_file(&args.config)?;
    let store = open_store(&config)?;

    let app = RelayerApp::bootstrap(config, store)
        .await
        .context("Failed to bootstrap relayer")?;
    if let Some(private_key) = &args.private_key {
        let address = app
            .state()
            .import_private_key(private_key)
            .await
            .context("Failed to import relayer key")?;
        info!(?address, "Relayer unlocked from command line");
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    if let Err(e) = app.run(cancel).await {
        error!(error = %e, "Relayer stopped with an error");
        return Err(e.into());
    }
    info!("Relayer stopped");
    Ok(())
}
