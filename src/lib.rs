//! # sstfile - Append-Only Sorted String Table Files
//!
//! sstfile implements a write-once table file format for key/value rows. A
//! producer streams rows to disk once, optionally attaches secondary indexes
//! that are persisted as footer blocks, and finalizes the file. Any number
//! of readers can then scan or random-access the finalized (or even a
//! partially written) file.
//!
//! ## Components
//!
//! - **Format**: byte-exact file header, row and footer block layouts
//! - **Editor**: appends checksummed rows page by page to a memory-mapped file
//! - **Reader**: parses the header and reads rows and footers from a stream
//! - **Cursor**: one iteration contract implemented by editor and reader
//! - **Indexes**: bloom filter and sparse key index, stored as footer blocks
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use sstfile::{Cursor, IndexProvider, SSTableEditor, SSTableReader};
//!
//! # fn main() -> Result<(), sstfile::Error> {
//! let mut editor = SSTableEditor::create("table.sst", IndexProvider::new(), b"my header")?;
//! editor.append_row(b"key1", b"value1")?;
//! editor.append_row(b"key2", b"value2")?;
//! editor.finalize()?;
//!
//! let mut reader = SSTableReader::open("table.sst")?;
//! let mut cursor = reader.get_cursor()?;
//! while cursor.valid() {
//!     println!("{:?} => {:?}", cursor.key_vec()?, cursor.data_vec()?);
//!     cursor.next()?;
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod config;
pub mod cursor;
pub mod editor;
pub mod error;
pub mod format;
pub mod hash;
pub mod index;
pub mod page;
pub mod reader;
pub mod scan;

// Re-exports
pub use config::{EditorOptions, ReaderOptions};
pub use cursor::Cursor;
pub use editor::{EditorCursor, SSTableEditor};
pub use error::{Error, Result};
pub use format::FileHeader;
pub use index::{Index, IndexProvider, IndexRef};
pub use reader::{FooterInfo, ReaderCursor, SSTableReader};
