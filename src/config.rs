//! Configuration options for table editors and readers.

/// Default step by which the page allocator grows the backing file.
pub const DEFAULT_ALLOCATION_GRANULARITY: u64 = 64 * 1024;

/// Configuration options for opening a table for writing.
#[derive(Debug, Clone)]
pub struct EditorOptions {
    /// Number of bytes the backing file grows by whenever an allocation
    /// does not fit into the currently mapped region. The padding is removed
    /// again when footers are written, on finalize and when the editor drops.
    /// Default: 64KB
    pub allocation_granularity: u64,

    /// Force every header, row and footer page to disk before the call
    /// that wrote it returns.
    /// Default: true
    pub sync_writes: bool,

    /// Reject appended keys that sort before the previously appended key.
    /// Key ordering is otherwise a caller contract that is not checked.
    /// Default: false
    pub check_key_order: bool,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            allocation_granularity: DEFAULT_ALLOCATION_GRANULARITY,
            sync_writes: true,
            check_key_order: false,
        }
    }
}

/// Configuration options for opening a table for reading.
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Verify the per-row checksum whenever a cursor materializes a row's
    /// data.
    /// Default: true
    pub verify_checksums: bool,

    /// For tables that were never finalized (on-disk body size of zero),
    /// treat everything after the header as the body instead of exposing an
    /// empty body.
    /// Default: false
    pub scan_unfinished: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self { verify_checksums: true, scan_unfinished: false }
    }
}
