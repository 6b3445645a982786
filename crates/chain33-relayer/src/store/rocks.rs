use super::{KeyValueStore, ListDirection, StoreResult, WriteBatch, WriteOp};
use crate::error::StoreError;
use rocksdb::{Direction, IteratorMode, Options, WriteOptions, DB};
use std::path::Path;

/// RocksDB-backed store used by the relayer binary.
pub struct RocksDbStore {
    db: DB,
}

impl RocksDbStore {
    pub fn open(db_path: &Path) -> StoreResult<Self> {
        let mut options = Options::default();
        options.create_if_missing(true);

        let db = DB::open(&options, db_path).map_err(|e| {
            StoreError::Backend(format!(
                "Failed to open database at {}: {e}",
                db_path.display()
            ))
        })?;
        Ok(Self { db })
    }

    fn sync_options(sync: bool) -> WriteOptions {
        let mut options = WriteOptions::default();
        options.set_sync(sync);
        options
    }
}

fn backend(e: rocksdb::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

impl KeyValueStore for RocksDbStore {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.db.get(key).map_err(backend)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.db
            .put_opt(key, value, &Self::sync_options(false))
            .map_err(backend)
    }

    fn set_sync(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.db
            .put_opt(key, value, &Self::sync_options(true))
            .map_err(backend)
    }

    fn delete(&self, key: &[u8]) -> StoreResult<()> {
        self.db
            .delete_opt(key, &Self::sync_options(true))
            .map_err(backend)
    }

    fn list(
        &self,
        prefix: &[u8],
        start: Option<&[u8]>,
        count: usize,
        direction: ListDirection,
    ) -> StoreResult<Vec<Vec<u8>>> {
        // Keys are ASCII, so 0xff sorts after every key sharing the prefix.
        let upper: Vec<u8> = [prefix, &[0xff]].concat();
        let mode = match (direction, start) {
            (ListDirection::Ascending, Some(start)) => IteratorMode::From(start, Direction::Forward),
            (ListDirection::Ascending, None) => IteratorMode::From(prefix, Direction::Forward),
            (ListDirection::Descending, Some(start)) => IteratorMode::From(start, Direction::Reverse),
            (ListDirection::Descending, None) => IteratorMode::From(&upper, Direction::Reverse),
        };

        let mut values = Vec::new();
        for item in self.db.iterator(mode) {
            let (key, value) = item.map_err(backend)?;
            if start.is_some_and(|start| key.as_ref() == start) {
                continue;
            }
            if !key.starts_with(prefix) {
                break;
            }
            values.push(value.to_vec());
            if count > 0 && values.len() == count {
                break;
            }
        }
        Ok(values)
    }

    fn write_batch(&self, batch: WriteBatch, sync: bool) -> StoreResult<()> {
        let mut rocks_batch = rocksdb::WriteBatch::default();
        for op in batch.into_ops() {
            match op {
                WriteOp::Put { key, value } => rocks_batch.put(key, value),
                WriteOp::Delete { key } => rocks_batch.delete(key),
            }
        }
        self.db
            .write_opt(rocks_batch, &Self::sync_options(sync))
            .map_err(backend)
    }
}
