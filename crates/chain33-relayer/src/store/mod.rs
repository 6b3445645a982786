//! Ordered key-value persistence shared by the event-log store, the scanner
//! checkpoint, the statistics ledger and the token-address cache.

pub mod keys;
mod memory;
#[cfg(feature = "rocksdb")]
mod rocks;

pub use memory::MemoryStore;
#[cfg(feature = "rocksdb")]
pub use rocks::RocksDbStore;

use crate::error::StoreError;
use serde::{de::DeserializeOwned, Serialize};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// A set of writes committed atomically.
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: Vec<u8>) {
        self.ops.push(WriteOp::Put {
            key: key.into(),
            value,
        });
    }

    pub fn put_json<T: Serialize>(&mut self, key: impl Into<Vec<u8>>, value: &T) -> StoreResult<()> {
        self.put(key, serde_json::to_vec(value)?);
        Ok(())
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.ops.push(WriteOp::Delete { key: key.into() });
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    fn set(&self, key: &[u8], value: &[u8]) -> StoreResult<()>;

    /// Like [`KeyValueStore::set`], but durable before returning.
    fn set_sync(&self, key: &[u8], value: &[u8]) -> StoreResult<()>;

    fn delete(&self, key: &[u8]) -> StoreResult<()>;

    /// Values under `prefix` in key order. The listing starts after `start`
    /// (exclusive) when given; `count == 0` means no limit.
    fn list(
        &self,
        prefix: &[u8],
        start: Option<&[u8]>,
        count: usize,
        direction: ListDirection,
    ) -> StoreResult<Vec<Vec<u8>>>;

    fn write_batch(&self, batch: WriteBatch, sync: bool) -> StoreResult<()>;
}

/// Typed helpers over the raw byte interface.
pub trait KeyValueStoreExt: KeyValueStore {
    fn get_json<T: DeserializeOwned>(&self, key: &[u8]) -> StoreResult<Option<T>> {
        self.get(key)?
            .map(|data| serde_json::from_slice(&data).map_err(StoreError::from))
            .transpose()
    }

    fn set_json_sync<T: Serialize>(&self, key: &[u8], value: &T) -> StoreResult<()> {
        self.set_sync(key, &serde_json::to_vec(value)?)
    }

    fn list_json<T: DeserializeOwned>(
        &self,
        prefix: &[u8],
        start: Option<&[u8]>,
        count: usize,
        direction: ListDirection,
    ) -> StoreResult<Vec<T>> {
        self.list(prefix, start, count, direction)?
            .iter()
            .map(|data| serde_json::from_slice(data).map_err(StoreError::from))
            .collect()
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}
