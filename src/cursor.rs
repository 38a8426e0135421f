//! Row cursor protocol.
//!
//! A cursor moves over the rows of the body region. It is either positioned
//! on a row (`valid() == true`) or past the end of the rows. Two
//! implementations exist: the editor's page-based cursor, which borrows rows
//! straight out of the memory-mapped file, and the reader's stream-based
//! cursor, which only copies key and data bytes that are actually accessed.
//!
//! # Example
//!
//! ```no_run
//! use sstfile::{Cursor, SSTableReader};
//!
//! # fn main() -> sstfile::Result<()> {
//! let mut reader = SSTableReader::open("table.sst")?;
//! let mut cursor = reader.get_cursor()?;
//! while cursor.valid() {
//!     println!("{:?} => {:?}", cursor.key_vec()?, cursor.data_vec()?);
//!     cursor.next()?;
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use crate::format::{RowHeader, ROW_HEADER_SIZE};

/// Iteration contract shared by every row cursor.
pub trait Cursor {
    /// Position the cursor on the row starting at `body_offset`.
    ///
    /// Fails with `IndexOutOfBounds` if the offset is not inside the body.
    fn seek_to(&mut self, body_offset: u64) -> Result<()>;

    /// Like `seek_to`, but returns `Ok(false)` for an out of bounds offset.
    fn try_seek_to(&mut self, body_offset: u64) -> Result<bool>;

    /// Advance to the following row.
    ///
    /// Returns `Ok(false)` once the end of the body is reached and the
    /// cursor becomes invalid. A row that claims more bytes than the body
    /// holds fails with `Corruption`.
    fn next(&mut self) -> Result<bool>;

    /// True if the cursor is positioned on a row.
    fn valid(&self) -> bool;

    /// Key of the current row.
    fn key(&mut self) -> Result<&[u8]>;

    /// Data of the current row.
    fn data(&mut self) -> Result<&[u8]>;

    /// Body offset of the current row.
    fn position(&self) -> u64;

    /// Body offset of the row following the current one.
    fn next_position(&self) -> Result<u64>;

    /// Copy of the current key.
    fn key_vec(&mut self) -> Result<Vec<u8>> {
        Ok(self.key()?.to_vec())
    }

    /// Copy of the current data.
    fn data_vec(&mut self) -> Result<Vec<u8>> {
        Ok(self.data()?.to_vec())
    }

    /// Current key as a (lossily decoded) string.
    fn key_string(&mut self) -> Result<String> {
        Ok(String::from_utf8_lossy(self.key()?).into_owned())
    }

    /// Current data as a (lossily decoded) string.
    fn data_string(&mut self) -> Result<String> {
        Ok(String::from_utf8_lossy(self.data()?).into_owned())
    }

    /// Copy of the current key and data.
    fn read_row(&mut self) -> Result<(Vec<u8>, Vec<u8>)> {
        let key = self.key_vec()?;
        let data = self.data_vec()?;
        Ok((key, data))
    }

    /// Iterate the remaining rows, starting with the current one.
    fn rows(&mut self) -> Rows<'_, Self>
    where
        Self: Sized,
    {
        Rows { cursor: self, pending: None, done: false }
    }
}

/// Iterator over the rows of a cursor, returned by [`Cursor::rows`].
pub struct Rows<'c, C> {
    cursor: &'c mut C,
    pending: Option<Error>,
    done: bool,
}

impl<C: Cursor> Iterator for Rows<'_, C> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.pending.take() {
            self.done = true;
            return Some(Err(err));
        }

        if self.done || !self.cursor.valid() {
            return None;
        }

        let row = match self.cursor.read_row() {
            Ok(row) => row,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };

        if let Err(e) = self.cursor.next() {
            self.pending = Some(e);
        }

        Some(Ok(row))
    }
}

/// What a cursor finds at a body offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RowSlot {
    /// The offset is exactly the end of the body.
    End,
    /// A well-formed row header whose row fits inside the body.
    Row(RowHeader),
    /// Bytes that can't be a row.
    Corrupt(String),
}

impl RowSlot {
    /// Classify the slot at a body offset with `remaining` body bytes after
    /// it. `read_header` is only called if a full row header fits.
    pub(crate) fn at<F>(remaining: u64, read_header: F) -> Result<Self>
    where
        F: FnOnce() -> Result<RowHeader>,
    {
        if remaining == 0 {
            return Ok(RowSlot::End);
        }

        if remaining < ROW_HEADER_SIZE as u64 {
            return Ok(RowSlot::Corrupt(format!(
                "Truncated row header: {} bytes left in body",
                remaining
            )));
        }

        let header = read_header()?;
        if header.key_size == 0 {
            return Ok(RowSlot::Corrupt("Row has an empty key".to_string()));
        }
        if header.data_size == 0 {
            return Ok(RowSlot::Corrupt("Row has empty data".to_string()));
        }
        if header.row_size() > remaining {
            return Ok(RowSlot::Corrupt(format!(
                "Row of {} bytes exceeds body bounds ({} bytes left)",
                header.row_size(),
                remaining
            )));
        }

        Ok(RowSlot::Row(header))
    }

    /// Turn the slot into the current row header, failing on corruption.
    pub(crate) fn into_row(self, body_offset: u64) -> Result<Option<RowHeader>> {
        match self {
            RowSlot::End => Ok(None),
            RowSlot::Row(header) => Ok(Some(header)),
            RowSlot::Corrupt(msg) => {
                Err(Error::corruption(format!("{} at body offset {}", msg, body_offset)))
            }
        }
    }
}

pub(crate) fn invalid_cursor() -> Error {
    Error::invalid_state("Cursor is not positioned on a row")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(key_size: u32, data_size: u32) -> RowHeader {
        RowHeader { checksum: 0, key_size, data_size }
    }

    #[test]
    fn test_slot_end() {
        let slot = RowSlot::at(0, || panic!("header must not be read")).unwrap();
        assert_eq!(slot, RowSlot::End);
        assert_eq!(slot.into_row(0).unwrap(), None);
    }

    #[test]
    fn test_slot_row() {
        let slot = RowSlot::at(20, || Ok(header(4, 4))).unwrap();
        assert_eq!(slot, RowSlot::Row(header(4, 4)));
    }

    #[test]
    fn test_slot_truncated_header() {
        let slot = RowSlot::at(5, || panic!("header must not be read")).unwrap();
        assert!(matches!(slot, RowSlot::Corrupt(_)));
        assert!(matches!(slot.into_row(3), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_slot_row_exceeds_body() {
        let slot = RowSlot::at(20, || Ok(header(4, 5))).unwrap();
        assert!(matches!(slot, RowSlot::Corrupt(_)));
    }

    #[test]
    fn test_slot_empty_key_or_data() {
        assert!(matches!(RowSlot::at(100, || Ok(header(0, 4))).unwrap(), RowSlot::Corrupt(_)));
        assert!(matches!(RowSlot::at(100, || Ok(header(4, 0))).unwrap(), RowSlot::Corrupt(_)));
    }
}
