mod app;
pub mod client;
mod config;
pub mod decoder;
pub mod error;
pub mod relay;
pub mod scanner;
pub mod server;
pub mod state;
pub mod store;
pub mod sync;
pub mod types;

#[cfg(test)]
mod test_utils;

pub use app::{resolve_bridge_contracts, RelayerApp};
pub use config::{
    Chain33Config, DestinationConfig, PrecisionConfig, PushConfig, RelayConfig, RelayerConfig,
};
pub use error::{BootstrapError, RelayerError};
