//! Data types for the ledger crate

/// A stored record as returned by a prefix scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Full key, including its namespace prefix
    pub key: String,
    /// Opaque payload; the caller owns the encoding
    pub value: Vec<u8>,
    /// Unix timestamp (seconds) of the last `put` for this key
    pub updated_at: i64,
}

impl Entry {
    /// The key with `prefix` stripped, if it carries it
    pub fn key_suffix<'a>(&'a self, prefix: &str) -> Option<&'a str> {
        self.key.strip_prefix(prefix)
    }
}

/// Counts of records held by a store, for status output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Total number of records
    pub records: u64,
    /// Most recent `updated_at` across all records
    pub last_write: Option<i64>,
}
