//! Sparse key index.
//!
//! Remembers the key and body offset of every Nth appended row. For a table
//! whose keys were appended in sorted order, a lookup yields the body offset
//! from which a cursor only has to scan at most N rows to find a key.

use super::{Index, FOOTER_TYPE_SPARSE_KEYS};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default number of rows between two sampled keys.
pub const DEFAULT_INTERVAL: u32 = 16;

/// A sampled key and the body offset of its row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseEntry {
    /// Sampled key.
    pub key: Vec<u8>,
    /// Body offset of the row holding the key.
    pub body_offset: u64,
}

/// Samples every `interval`-th row's key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseKeyIndex {
    interval: u32,
    num_rows: u64,
    entries: Vec<SparseEntry>,
}

impl SparseKeyIndex {
    /// Create an index sampling every `interval`-th row.
    pub fn new(interval: u32) -> Self {
        Self { interval: interval.max(1), num_rows: 0, entries: Vec::new() }
    }

    /// Decode an index from a footer payload.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let index: Self = bincode::deserialize(data)?;
        if index.interval == 0 {
            return Err(Error::corruption("Sparse key index with zero interval"));
        }
        Ok(index)
    }

    /// Body offset from which to scan for `key`: the offset of the last
    /// sampled key that is not greater than `key`.
    ///
    /// Returns `None` if `key` sorts before every sampled key. Only
    /// meaningful for tables whose keys were appended in sorted order.
    pub fn lookup(&self, key: &[u8]) -> Option<u64> {
        let idx = self.entries.partition_point(|e| e.key.as_slice() <= key);
        idx.checked_sub(1).map(|i| self.entries[i].body_offset)
    }

    /// Sampled entries in append order.
    pub fn entries(&self) -> &[SparseEntry] {
        &self.entries
    }

    /// Number of rows seen, sampled or not.
    pub fn num_rows(&self) -> u64 {
        self.num_rows
    }

    /// Rows between two samples.
    pub fn interval(&self) -> u32 {
        self.interval
    }
}

impl Default for SparseKeyIndex {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

impl Index for SparseKeyIndex {
    fn footer_type(&self) -> u32 {
        FOOTER_TYPE_SPARSE_KEYS
    }

    fn add_row(&mut self, body_offset: u64, key: &[u8], _data: &[u8]) {
        if self.num_rows % self.interval as u64 == 0 {
            self.entries.push(SparseEntry { key: key.to_vec(), body_offset });
        }
        self.num_rows += 1;
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
}
