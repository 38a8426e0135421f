//! Table editor: the append-time writer.
//!
//! The editor writes the file header into the first page of the file, then
//! appends each row as its own page directly behind the previous one. The
//! header's body size field stays zero until `finalize`, which is what lets
//! an unfinished table be reopened and appended to later.
//!
//! An editor is a single-owner handle: every mutating operation takes
//! `&mut self`, and there is no internal locking. Share it across threads
//! only behind your own lock.

use crate::config::EditorOptions;
use crate::cursor::{invalid_cursor, Cursor, RowSlot};
use crate::error::{Error, Result};
use crate::format::{FileHeader, FooterHeader, RowHeader, FOOTER_HEADER_SIZE, FOOTER_TYPE_ANY, ROW_HEADER_SIZE};
use crate::index::{IndexProvider, IndexRef};
use crate::page::{MmapPageManager, Page};
use std::path::Path;

/// Appends rows and footer blocks to a table file.
///
/// Usage:
/// ```no_run
/// use sstfile::{IndexProvider, SSTableEditor};
///
/// let mut editor = SSTableEditor::create("table.sst", IndexProvider::new(), b"meta").unwrap();
/// editor.append_row(b"key1", b"value1").unwrap();
/// editor.append_row(b"key2", b"value2").unwrap();
/// editor.finalize().unwrap();
/// ```
pub struct SSTableEditor {
    pages: MmapPageManager,
    indexes: Vec<IndexRef>,
    options: EditorOptions,
    version: u16,
    header_size: u64,
    body_size: u64,
    finalized: bool,
    footers_written: bool,
    last_key: Option<Vec<u8>>,
}

impl SSTableEditor {
    /// Create a new table at `path` and write its header.
    ///
    /// Fails with `AlreadyExists` if the file exists and is not empty.
    pub fn create<P: AsRef<Path>>(path: P, index_provider: IndexProvider, userdata: &[u8]) -> Result<Self> {
        Self::create_with_options(path, index_provider, userdata, EditorOptions::default())
    }

    /// Create a new table with explicit options.
    pub fn create_with_options<P: AsRef<Path>>(
        path: P,
        mut index_provider: IndexProvider,
        userdata: &[u8],
        options: EditorOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        let pages = MmapPageManager::open(path, options.allocation_granularity)?;
        if pages.end_pos() > 0 {
            return Err(Error::AlreadyExists(format!("{:?} is not empty", path)));
        }

        let mut editor = Self::new(pages, index_provider.take_indexes(), options);
        editor.write_header(userdata)?;

        log::info!("Created table {:?} with {} indexes", path, editor.indexes.len());
        Ok(editor)
    }

    /// Reopen a table that was never finalized to append more rows.
    ///
    /// Fails with `AlreadyFinalized` if the header doesn't verify or records
    /// a body size, and with `Corruption` if the header exceeds the file.
    pub fn reopen<P: AsRef<Path>>(path: P, index_provider: IndexProvider) -> Result<Self> {
        Self::reopen_with_options(path, index_provider, EditorOptions::default())
    }

    /// Reopen an unfinished table with explicit options.
    pub fn reopen_with_options<P: AsRef<Path>>(
        path: P,
        mut index_provider: IndexProvider,
        options: EditorOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::not_found(format!("Table {:?}", path)));
        }

        let pages = MmapPageManager::open(path, options.allocation_granularity)?;
        let file_size = pages.end_pos();

        let file = pages.page(Page::new(0, file_size))?;
        let header = FileHeader::decode(file)?;

        if !header.verify(file) {
            return Err(Error::AlreadyFinalized(format!("{:?} has a corrupt header", path)));
        }

        if header.body_size() != 0 || header.is_finalized() {
            return Err(Error::AlreadyFinalized(format!("{:?} was finalized and can't be reopened", path)));
        }

        if header.header_size() + header.body_size() > file_size {
            return Err(Error::corruption("File metadata offsets exceed file bounds"));
        }

        let mut editor = Self::new(pages, index_provider.take_indexes(), options);
        editor.version = header.version();
        editor.header_size = header.header_size();
        editor.body_size = file_size - editor.header_size;

        if editor.options.check_key_order {
            editor.last_key = editor.find_last_key()?;
        }

        log::info!("Reopened table {:?}, resuming at body offset {}", path, editor.body_size);
        Ok(editor)
    }

    fn new(pages: MmapPageManager, indexes: Vec<IndexRef>, options: EditorOptions) -> Self {
        Self {
            pages,
            indexes,
            options,
            version: crate::format::CURRENT_VERSION,
            header_size: 0,
            body_size: 0,
            finalized: false,
            footers_written: false,
            last_key: None,
        }
    }

    /// Append a row and return its body offset.
    ///
    /// Keys are expected in ascending order; this is only checked when
    /// `EditorOptions::check_key_order` is set. Empty keys and empty data
    /// are rejected.
    pub fn append_row<K, D>(&mut self, key: K, data: D) -> Result<u64>
    where
        K: AsRef<[u8]>,
        D: AsRef<[u8]>,
    {
        let (key, data) = (key.as_ref(), data.as_ref());

        if self.finalized {
            return Err(Error::ImmutableTable);
        }

        if data.is_empty() {
            return Err(Error::invalid_argument("Can't append a row with empty data"));
        }

        if key.is_empty() {
            return Err(Error::invalid_argument("Can't append a row with an empty key"));
        }

        if u32::try_from(key.len()).is_err() || u32::try_from(data.len()).is_err() {
            return Err(Error::invalid_argument("Row key and data must each be below 4GB"));
        }

        if self.options.check_key_order {
            if let Some(last) = &self.last_key {
                if key < last.as_slice() {
                    return Err(Error::invalid_argument("Keys must be appended in sorted order"));
                }
            }
        }

        if self.header_size == 0 {
            return Err(Error::invalid_state("Header must be written before rows"));
        }

        if self.footers_written {
            return Err(Error::invalid_state("Rows can't be appended after a footer block"));
        }

        let header = RowHeader::for_row(key, data);
        let page = self.pages.alloc_page(header.row_size())?;
        if page.offset != self.header_size + self.body_size {
            return Err(Error::invalid_state(format!(
                "Row page at {} does not continue the body ending at {}",
                page.offset,
                self.header_size + self.body_size
            )));
        }
        {
            let buf = self.pages.page_mut(page)?;
            header.encode_into(buf);
            buf[ROW_HEADER_SIZE..ROW_HEADER_SIZE + key.len()].copy_from_slice(key);
            buf[ROW_HEADER_SIZE + key.len()..].copy_from_slice(data);
        }
        self.sync(page)?;

        let body_offset = self.body_size;
        self.body_size += page.size;

        for index in &self.indexes {
            index.lock().add_row(body_offset, key, data);
        }

        if self.options.check_key_order {
            self.last_key = Some(key.to_vec());
        }

        log::trace!("Appended row at body offset {} ({} bytes)", body_offset, page.size);
        Ok(body_offset)
    }

    /// Write the file header carrying `userdata` at offset 0.
    ///
    /// Called by `create`; fails with `HeaderAlreadyWritten` afterwards.
    pub fn write_header(&mut self, userdata: &[u8]) -> Result<()> {
        if self.header_size > 0 {
            return Err(Error::HeaderAlreadyWritten);
        }

        let header_size = FileHeader::encoded_size(userdata.len()) as u64;
        let page = self.pages.alloc_page(header_size)?;
        if page.offset != 0 {
            return Err(Error::invalid_state(format!(
                "Header page must start at offset 0, got {}",
                page.offset
            )));
        }

        FileHeader::encode(self.pages.page_mut(page)?, 0, 0, userdata)?;
        self.sync(page)?;
        self.header_size = header_size;

        Ok(())
    }

    /// Append a footer block of `footer_type` holding `payload`.
    ///
    /// Footer blocks go after all rows: once one is written, `append_row`
    /// fails with `InvalidState`. An empty payload writes nothing.
    pub fn write_footer(&mut self, footer_type: u32, payload: &[u8]) -> Result<()> {
        if self.finalized {
            return Err(Error::ImmutableTable);
        }

        if payload.is_empty() {
            return Ok(());
        }

        if footer_type == FOOTER_TYPE_ANY {
            return Err(Error::invalid_argument("Footer type 0 is reserved"));
        }

        if u32::try_from(payload.len()).is_err() {
            return Err(Error::invalid_argument("Footer payload must be below 4GB"));
        }

        let header = FooterHeader::for_payload(footer_type, payload);
        let page = self.pages.alloc_page((FOOTER_HEADER_SIZE + payload.len()) as u64)?;
        {
            let buf = self.pages.page_mut(page)?;
            header.encode_into(buf);
            buf[FOOTER_HEADER_SIZE..].copy_from_slice(payload);
        }
        self.sync(page)?;
        self.footers_written = true;
        self.pages.shrink_file()?;

        log::debug!("Wrote footer of type {} ({} bytes) at {}", footer_type, payload.len(), page.offset);
        Ok(())
    }

    /// Serialize every attached index into its own footer block.
    pub fn write_index_footers(&mut self) -> Result<()> {
        let encoded = self
            .indexes
            .iter()
            .map(|index| {
                let index = index.lock();
                Ok((index.footer_type(), index.encode()?))
            })
            .collect::<Result<Vec<_>>>()?;

        for (footer_type, payload) in encoded {
            self.write_footer(footer_type, &payload)?;
        }

        Ok(())
    }

    /// Record the body size and the finalized flag in the header, making
    /// the table immutable.
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Err(Error::ImmutableTable);
        }
        self.finalized = true;

        let page = Page::new(0, FileHeader::preamble_size(self.version)? as u64);
        FileHeader::finalize_in_place(self.pages.page_mut(page)?, self.version, self.body_size)?;
        self.pages.sync(page)?;
        self.pages.shrink_file()?;

        log::info!(
            "Finalized table {:?} (header {} bytes, body {} bytes)",
            self.pages.path(),
            self.header_size,
            self.body_size
        );
        Ok(())
    }

    /// Create a cursor positioned on the first row.
    pub fn get_cursor(&self) -> Result<EditorCursor<'_>> {
        EditorCursor::new(self)
    }

    /// Size of the row region in bytes.
    pub fn body_size(&self) -> u64 {
        self.body_size
    }

    /// Size of the header (preamble and userdata) in bytes.
    pub fn header_size(&self) -> u64 {
        self.header_size
    }

    /// True once `finalize` was called.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Indexes attached at construction.
    pub fn indexes(&self) -> &[IndexRef] {
        &self.indexes
    }

    /// Path of the table file.
    pub fn path(&self) -> &Path {
        self.pages.path()
    }

    fn sync(&self, page: Page) -> Result<()> {
        if self.options.sync_writes {
            self.pages.sync(page)?;
        }
        Ok(())
    }

    fn find_last_key(&self) -> Result<Option<Vec<u8>>> {
        let mut cursor = self.get_cursor()?;
        let mut last = None;
        while cursor.valid() {
            last = Some(cursor.key_vec()?);
            cursor.next()?;
        }
        Ok(last)
    }

    /// Bytes of the body from `body_offset` to the end of the body.
    fn body_from(&self, body_offset: u64) -> Result<&[u8]> {
        let start = self.header_size + body_offset;
        let end = self.header_size + self.body_size;
        self.pages.page(Page::new(start, end.saturating_sub(start)))
    }
}

/// Zero-copy cursor over the rows of an editor.
///
/// Every access maps the body from the current position on, so row bounds
/// are always checked against the editor's current body size.
pub struct EditorCursor<'a> {
    table: &'a SSTableEditor,
    pos: u64,
    current: Option<RowHeader>,
}

impl<'a> EditorCursor<'a> {
    fn new(table: &'a SSTableEditor) -> Result<Self> {
        let mut cursor = Self { table, pos: 0, current: None };
        cursor.load()?;
        Ok(cursor)
    }

    fn load(&mut self) -> Result<()> {
        self.current = None;
        let remaining = self.table.body_size.saturating_sub(self.pos);
        let slot = RowSlot::at(remaining, || RowHeader::decode(self.table.body_from(self.pos)?))?;
        self.current = slot.into_row(self.pos)?;
        Ok(())
    }

    fn row(&self) -> Result<(RowHeader, &'a [u8])> {
        let header = self.current.ok_or_else(invalid_cursor)?;
        let body = self.table.body_from(self.pos)?;
        if (body.len() as u64) < header.row_size() {
            return Err(Error::invalid_state("Row exceeds page boundary"));
        }
        Ok((header, &body[..header.row_size() as usize]))
    }
}

impl Cursor for EditorCursor<'_> {
    fn seek_to(&mut self, body_offset: u64) -> Result<()> {
        if !self.try_seek_to(body_offset)? {
            return Err(Error::IndexOutOfBounds { offset: body_offset, body_size: self.table.body_size });
        }
        Ok(())
    }

    fn try_seek_to(&mut self, body_offset: u64) -> Result<bool> {
        if body_offset >= self.table.body_size {
            return Ok(false);
        }

        self.pos = body_offset;
        self.load()?;
        Ok(true)
    }

    fn next(&mut self) -> Result<bool> {
        let Some(header) = self.current else {
            return Ok(false);
        };

        self.pos += header.row_size();
        self.load()?;
        Ok(self.current.is_some())
    }

    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn key(&mut self) -> Result<&[u8]> {
        let (header, row) = self.row()?;
        Ok(&row[ROW_HEADER_SIZE..ROW_HEADER_SIZE + header.key_size as usize])
    }

    fn data(&mut self) -> Result<&[u8]> {
        let (header, row) = self.row()?;
        Ok(&row[ROW_HEADER_SIZE + header.key_size as usize..])
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn next_position(&self) -> Result<u64> {
        let header = self.current.ok_or_else(invalid_cursor)?;
        Ok(self.pos + header.row_size())
    }
}
