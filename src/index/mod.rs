//! Secondary indexes built while rows are appended.
//!
//! An editor notifies every attached index of each appended row. Before the
//! table is finalized each index serializes itself into one footer block of
//! its own type, from where readers load it again.

pub mod bloom;
pub mod sparse;

pub use bloom::BloomFilterIndex;
pub use sparse::SparseKeyIndex;

use crate::error::Result;
use parking_lot::Mutex;
use std::sync::Arc;

/// Footer type of a serialized [`BloomFilterIndex`].
pub const FOOTER_TYPE_BLOOM: u32 = 1;

/// Footer type of a serialized [`SparseKeyIndex`].
pub const FOOTER_TYPE_SPARSE_KEYS: u32 = 2;

/// A secondary index fed with every appended row.
pub trait Index: Send {
    /// Footer type the serialized index is stored under.
    fn footer_type(&self) -> u32;

    /// Record a row that was appended at `body_offset`.
    fn add_row(&mut self, body_offset: u64, key: &[u8], data: &[u8]);

    /// Serialize the index into a footer payload.
    fn encode(&self) -> Result<Vec<u8>>;
}

/// Shared handle to an index. The editor holds one clone, the caller may
/// keep another to inspect the index while rows are appended.
pub type IndexRef = Arc<Mutex<dyn Index>>;

/// Collects the indexes an editor attaches when it is constructed.
#[derive(Default)]
pub struct IndexProvider {
    indexes: Vec<IndexRef>,
}

impl IndexProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an index and return a typed handle to it.
    pub fn add_index<I: Index + 'static>(&mut self, index: I) -> Arc<Mutex<I>> {
        let handle = Arc::new(Mutex::new(index));
        self.indexes.push(handle.clone());
        handle
    }

    /// Attach an already shared index.
    pub fn push(&mut self, index: IndexRef) {
        self.indexes.push(index);
    }

    /// Remove and return every attached index.
    pub fn take_indexes(&mut self) -> Vec<IndexRef> {
        std::mem::take(&mut self.indexes)
    }

    /// Number of attached indexes.
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    /// True if no index is attached.
    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }
}
