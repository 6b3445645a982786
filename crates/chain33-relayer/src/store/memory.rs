use super::{KeyValueStore, ListDirection, StoreResult, WriteBatch, WriteOp};
use crate::error::StoreError;
use std::{
    collections::BTreeMap,
    ops::Bound,
    sync::{
        atomic::{AtomicBool, Ordering},
        RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};

/// In-process ordered store. Writes are trivially "durable" for the lifetime
/// of the process, which is all tests and dry runs need.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following write fail, to exercise crash-before-commit paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>> {
        self.entries
            .read()
            .map_err(|e| StoreError::Backend(format!("poisoned lock: {e}")))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("write rejected".to_string()));
        }
        self.entries
            .write()
            .map_err(|e| StoreError::Backend(format!("poisoned lock: {e}")))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.read()?.get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.write()?.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn set_sync(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.set(key, value)
    }

    fn delete(&self, key: &[u8]) -> StoreResult<()> {
        self.write()?.remove(key);
        Ok(())
    }

    fn list(
        &self,
        prefix: &[u8],
        start: Option<&[u8]>,
        count: usize,
        direction: ListDirection,
    ) -> StoreResult<Vec<Vec<u8>>> {
        let entries = self.read()?;
        let in_prefix = entries
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix));

        let mut values: Vec<Vec<u8>> = match direction {
            ListDirection::Ascending => in_prefix
                .filter(|(key, _)| start.map_or(true, |start| key.as_slice() > start))
                .map(|(_, value)| value.clone())
                .collect(),
            ListDirection::Descending => {
                let mut values: Vec<Vec<u8>> = in_prefix
                    .filter(|(key, _)| start.map_or(true, |start| key.as_slice() < start))
                    .map(|(_, value)| value.clone())
                    .collect();
                values.reverse();
                values
            }
        };

        if count > 0 {
            values.truncate(count);
        }
        Ok(values)
    }

    fn write_batch(&self, batch: WriteBatch, _sync: bool) -> StoreResult<()> {
        let mut entries = self.write()?;
        for op in batch.into_ops() {
            match op {
                WriteOp::Put { key, value } => {
                    entries.insert(key, value);
                }
                WriteOp::Delete { key } => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(keys: &[&str]) -> MemoryStore {
        let store = MemoryStore::new();
        for key in keys {
            store.set(key.as_bytes(), key.as_bytes()).unwrap();
        }
        store
    }

    fn as_strings(values: Vec<Vec<u8>>) -> Vec<String> {
        values
            .into_iter()
            .map(|v| String::from_utf8(v).unwrap())
            .collect()
    }

    #[test]
    fn list_is_prefix_bounded_and_start_exclusive() {
        let store = store_with(&["a-1", "a-2", "a-3", "b-1"]);

        let all = store.list(b"a-", None, 0, ListDirection::Ascending).unwrap();
        assert_eq!(as_strings(all), vec!["a-1", "a-2", "a-3"]);

        let after = store
            .list(b"a-", Some(b"a-1"), 0, ListDirection::Ascending)
            .unwrap();
        assert_eq!(as_strings(after), vec!["a-2", "a-3"]);

        let limited = store.list(b"a-", None, 2, ListDirection::Ascending).unwrap();
        assert_eq!(as_strings(limited), vec!["a-1", "a-2"]);
    }

    #[test]
    fn list_descending_walks_backwards_from_start() {
        let store = store_with(&["a-1", "a-2", "a-3"]);
        let values = store
            .list(b"a-", Some(b"a-3"), 0, ListDirection::Descending)
            .unwrap();
        assert_eq!(as_strings(values), vec!["a-2", "a-1"]);
    }

    #[test]
    fn failed_batch_leaves_store_untouched() {
        let store = store_with(&["k"]);
        store.set_fail_writes(true);

        let mut batch = WriteBatch::new();
        batch.put("x", b"1".to_vec());
        batch.delete("k");
        assert!(store.write_batch(batch, true).is_err());

        store.set_fail_writes(false);
        assert_eq!(store.get(b"x").unwrap(), None);
        assert_eq!(store.get(b"k").unwrap(), Some(b"k".to_vec()));
    }
}
