//! In-memory record store

use crate::error::{Error, Result};
use crate::types::Entry;
use crate::RecordStore;
use std::collections::BTreeMap;

/// A `BTreeMap`-backed store with the same ordering as [`crate::SqliteStore`]
///
/// Counts every mutation so tests can assert that a run wrote nothing.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    records: BTreeMap<String, (Vec<u8>, i64)>,
    writes: usize,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy every record of another store
    ///
    /// The copy starts with a zero write count.
    pub fn snapshot_of(source: &dyn RecordStore) -> Result<Self> {
        let records = source
            .scan_prefix("")?
            .into_iter()
            .map(|e| (e.key, (e.value, e.updated_at)))
            .collect();
        Ok(Self { records, writes: 0 })
    }

    /// Number of `put` and successful `delete` calls so far
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// All keys, in order
    pub fn keys(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.records.get(key).map(|(value, _)| value.clone()))
    }

    fn put(&mut self, key: &str, value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        let now = chrono::Utc::now().timestamp();
        self.records.insert(key.to_string(), (value.to_vec(), now));
        self.writes += 1;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<bool> {
        let removed = self.records.remove(key).is_some();
        if removed {
            self.writes += 1;
        }
        Ok(removed)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<Entry>> {
        Ok(self
            .records
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, (value, updated_at))| Entry {
                key: key.clone(),
                value: value.clone(),
                updated_at: *updated_at,
            })
            .collect())
    }
}
