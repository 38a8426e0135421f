//! Table reader: read-only access through a seekable byte stream.
//!
//! Opening a table parses the header and nothing else. Rows are read by a
//! cursor that only copies a row's key and data once they are asked for,
//! and footer blocks are found by scanning forward from the end of the body.

use crate::config::ReaderOptions;
use crate::cursor::{invalid_cursor, Cursor, RowSlot};
use crate::error::{Error, Result};
use crate::format::{FileHeader, FooterHeader, RowHeader, FOOTER_HEADER_SIZE, FOOTER_TYPE_ANY, ROW_HEADER_SIZE};
use bytes::Bytes;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Location of a footer block found by scanning the footer region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FooterInfo {
    /// Footer type.
    pub footer_type: u32,
    /// File offset of the footer block header.
    pub offset: u64,
    /// Payload size in bytes.
    pub size: u32,
}

/// SSTableReader provides read access to a finalized or unfinished table.
///
/// Usage:
/// ```no_run
/// use sstfile::{Cursor, SSTableReader};
///
/// let mut reader = SSTableReader::open("table.sst").unwrap();
/// let userdata = reader.read_header().unwrap();
/// let rows = reader.count_rows().unwrap();
/// println!("{} rows, {} bytes of userdata", rows, userdata.len());
/// ```
pub struct SSTableReader<R = File> {
    stream: BufReader<R>,
    header: FileHeader,
    file_size: u64,
    body_size: u64,
    options: ReaderOptions,
}

impl SSTableReader<File> {
    /// Open the table at `path` with default options.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, ReaderOptions::default())
    }

    /// Open the table at `path`.
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Self> {
        let path = path.as_ref();
        let reader = Self::from_reader(File::open(path)?, options)?;

        if !reader.is_finalized() {
            log::warn!("Table {:?} is unfinished", path);
        }
        log::info!(
            "Opened table {:?} (header {} bytes, body {} bytes)",
            path,
            reader.header_size(),
            reader.body_size()
        );
        Ok(reader)
    }
}

impl<R: Read + Seek> SSTableReader<R> {
    /// Read a table from an arbitrary seekable stream.
    pub fn from_reader(inner: R, options: ReaderOptions) -> Result<Self> {
        let mut stream = BufReader::new(inner);
        let file_size = stream.seek(SeekFrom::End(0))?;
        stream.seek(SeekFrom::Start(0))?;

        let header = FileHeader::read_from(&mut stream)?;

        if header.body_size() > 0 {
            let body_end = header.header_size().checked_add(header.body_size());
            if !matches!(body_end, Some(end) if end <= file_size) {
                return Err(Error::corruption("File metadata offsets exceed file bounds"));
            }
        }

        let body_size = if header.is_finalized() || !options.scan_unfinished {
            header.body_size()
        } else {
            file_size.saturating_sub(header.header_size())
        };

        Ok(Self { stream, header, file_size, body_size, options })
    }

    /// Copy of the header userdata blob.
    pub fn read_header(&mut self) -> Result<Bytes> {
        if !self.header.userdata_fits(self.file_size) {
            return Err(Error::corruption("Header userdata exceeds file bounds"));
        }

        self.stream.seek(SeekFrom::Start(self.header.userdata_offset()))?;
        let mut buf = vec![0u8; self.header.userdata_size() as usize];
        read_exact(&mut self.stream, &mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Payload of the first footer block of `footer_type`.
    ///
    /// Fails with `NotFound` if there is no such footer, and with
    /// `Corruption` or `ChecksumMismatch` on a damaged footer region.
    pub fn read_footer(&mut self, footer_type: u32) -> Result<Bytes> {
        self.read_footer_optional(footer_type)?
            .ok_or_else(|| Error::not_found(format!("Footer of type {}", footer_type)))
    }

    /// Like `read_footer`, but returns `Ok(None)` if no footer matches.
    pub fn read_footer_optional(&mut self, footer_type: u32) -> Result<Option<Bytes>> {
        let mut pos = self.footer_region_offset();
        self.stream.seek(SeekFrom::Start(pos))?;

        while pos < self.file_size {
            let header = self.next_footer_header(pos)?;
            pos += (FOOTER_HEADER_SIZE + header.footer_size as usize) as u64;

            if footer_type != FOOTER_TYPE_ANY && header.footer_type == footer_type {
                let mut buf = vec![0u8; header.footer_size as usize];
                read_exact(&mut self.stream, &mut buf)?;
                header.verify(&buf)?;
                return Ok(Some(Bytes::from(buf)));
            }

            self.stream.seek_relative(header.footer_size as i64)?;
        }

        Ok(None)
    }

    /// Every footer block in file order.
    pub fn footers(&mut self) -> Result<Vec<FooterInfo>> {
        let mut footers = Vec::new();
        let mut pos = self.footer_region_offset();
        self.stream.seek(SeekFrom::Start(pos))?;

        while pos < self.file_size {
            let header = self.next_footer_header(pos)?;
            footers.push(FooterInfo { footer_type: header.footer_type, offset: pos, size: header.footer_size });
            pos += (FOOTER_HEADER_SIZE + header.footer_size as usize) as u64;
            self.stream.seek_relative(header.footer_size as i64)?;
        }

        Ok(footers)
    }

    /// Read the footer block header at `pos`, where the stream is positioned.
    fn next_footer_header(&mut self, pos: u64) -> Result<FooterHeader> {
        if self.file_size - pos < FOOTER_HEADER_SIZE as u64 {
            return Err(Error::corruption(format!("Truncated footer block at offset {}", pos)));
        }

        let mut buf = [0u8; FOOTER_HEADER_SIZE];
        read_exact(&mut self.stream, &mut buf)?;
        let header = FooterHeader::decode(&buf)?;

        if pos + (FOOTER_HEADER_SIZE as u64) + header.footer_size as u64 > self.file_size {
            return Err(Error::corruption(format!("Footer block at offset {} exceeds file bounds", pos)));
        }

        log::debug!("Found footer of type {} ({} bytes) at {}", header.footer_type, header.footer_size, pos);
        Ok(header)
    }

    fn footer_region_offset(&self) -> u64 {
        self.header.header_size() + self.body_size
    }

    /// Check that the userdata fits in the file and matches its checksum.
    pub fn verify(&mut self) -> Result<bool> {
        if !self.header.userdata_fits(self.file_size) {
            return Ok(false);
        }

        let userdata = self.read_header()?;
        Ok(self.header.verify_userdata(&userdata))
    }

    /// Create a cursor over the body, positioned on the first row.
    pub fn get_cursor(&mut self) -> Result<ReaderCursor<'_, R>> {
        ReaderCursor::new(
            &mut self.stream,
            self.header.header_size(),
            self.body_size,
            self.options.verify_checksums,
        )
    }

    /// Number of rows in the table.
    ///
    /// No header version records a row count, so this scans every row
    /// header of the body.
    pub fn count_rows(&mut self) -> Result<u64> {
        let mut cursor = self.get_cursor()?;
        let mut count = 0;
        while cursor.valid() {
            count += 1;
            cursor.next()?;
        }
        Ok(count)
    }

    /// Size of the body the cursor is bounded by.
    ///
    /// For unfinished tables this is zero, unless the reader was opened with
    /// `ReaderOptions::scan_unfinished`.
    pub fn body_size(&self) -> u64 {
        self.body_size
    }

    /// File offset of the first body byte.
    pub fn body_offset(&self) -> u64 {
        self.header.header_size()
    }

    /// Size of the header, preamble and userdata, in bytes.
    pub fn header_size(&self) -> u64 {
        self.header.header_size()
    }

    /// Size of the userdata blob in bytes.
    pub fn userdata_size(&self) -> u64 {
        self.header.userdata_size()
    }

    /// True if the table was finalized.
    pub fn is_finalized(&self) -> bool {
        self.header.is_finalized()
    }

    /// Size of the underlying stream in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// The parsed file header.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }
}

/// Stream-based cursor over the rows of a reader.
///
/// Key and data bytes are copied into private buffers the first time they
/// are accessed; `next` skips whatever was never read.
pub struct ReaderCursor<'a, R> {
    stream: &'a mut BufReader<R>,
    begin: u64,
    body_size: u64,
    verify_checksums: bool,
    pos: u64,
    current: Option<RowHeader>,
    key: Vec<u8>,
    data: Vec<u8>,
    have_key: bool,
    have_data: bool,
    data_verified: bool,
}

impl<'a, R: Read + Seek> ReaderCursor<'a, R> {
    fn new(stream: &'a mut BufReader<R>, begin: u64, body_size: u64, verify_checksums: bool) -> Result<Self> {
        let mut cursor = Self {
            stream,
            begin,
            body_size,
            verify_checksums,
            pos: 0,
            current: None,
            key: Vec::new(),
            data: Vec::new(),
            have_key: false,
            have_data: false,
            data_verified: false,
        };
        cursor.stream.seek(SeekFrom::Start(begin))?;
        cursor.fetch_meta()?;
        Ok(cursor)
    }

    /// Read the row header at `pos`. The stream must be positioned there.
    fn fetch_meta(&mut self) -> Result<()> {
        self.current = None;
        self.have_key = false;
        self.have_data = false;
        self.data_verified = false;

        let remaining = self.body_size.saturating_sub(self.pos);
        let stream = &mut *self.stream;
        let slot = RowSlot::at(remaining, || {
            let mut buf = [0u8; ROW_HEADER_SIZE];
            read_exact(stream, &mut buf)?;
            RowHeader::decode(&buf)
        })?;
        self.current = slot.into_row(self.pos)?;
        Ok(())
    }

    fn load_key(&mut self, header: &RowHeader) -> Result<()> {
        if !self.have_key {
            self.key.resize(header.key_size as usize, 0);
            read_exact(&mut *self.stream, &mut self.key)?;
            self.have_key = true;
        }
        Ok(())
    }

    fn load_data(&mut self, header: &RowHeader) -> Result<()> {
        self.load_key(header)?;
        if !self.have_data {
            self.data.resize(header.data_size as usize, 0);
            read_exact(&mut *self.stream, &mut self.data)?;
            self.have_data = true;
        }
        if self.verify_checksums && !self.data_verified {
            header.verify(&self.key, &self.data)?;
            self.data_verified = true;
        }
        Ok(())
    }
}

impl<R: Read + Seek> Cursor for ReaderCursor<'_, R> {
    fn seek_to(&mut self, body_offset: u64) -> Result<()> {
        if !self.try_seek_to(body_offset)? {
            return Err(Error::IndexOutOfBounds { offset: body_offset, body_size: self.body_size });
        }
        Ok(())
    }

    fn try_seek_to(&mut self, body_offset: u64) -> Result<bool> {
        if body_offset >= self.body_size {
            return Ok(false);
        }

        self.pos = body_offset;
        self.stream.seek(SeekFrom::Start(self.begin + body_offset))?;
        self.fetch_meta()?;
        Ok(true)
    }

    fn next(&mut self) -> Result<bool> {
        let Some(header) = self.current else {
            return Ok(false);
        };

        let mut skip = 0i64;
        if !self.have_key {
            skip += header.key_size as i64;
        }
        if !self.have_data {
            skip += header.data_size as i64;
        }
        self.stream.seek_relative(skip)?;

        self.pos += header.row_size();
        self.fetch_meta()?;
        Ok(self.current.is_some())
    }

    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn key(&mut self) -> Result<&[u8]> {
        let header = self.current.ok_or_else(invalid_cursor)?;
        self.load_key(&header)?;
        Ok(&self.key)
    }

    fn data(&mut self) -> Result<&[u8]> {
        let header = self.current.ok_or_else(invalid_cursor)?;
        self.load_data(&header)?;
        Ok(&self.data)
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn next_position(&self) -> Result<u64> {
        let header = self.current.ok_or_else(invalid_cursor)?;
        Ok(self.pos + header.row_size())
    }
}

/// `read_exact` that reports a stream ending early as corruption: every
/// read is bounded by sizes recorded in the file.
fn read_exact<R: Read>(stream: &mut R, buf: &mut [u8]) -> Result<()> {
    match stream.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            Err(Error::corruption("Unexpected end of file"))
        }
        Err(e) => Err(Error::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::VERSION_1;
    use std::io::Cursor as IoCursor;

    /// Build a table image in memory: header, rows, footers.
    fn image(userdata: &[u8], rows: &[(&[u8], &[u8])], footers: &[(u32, &[u8])], finalized: bool) -> Vec<u8> {
        let mut body = Vec::new();
        for (key, data) in rows {
            let header = RowHeader::for_row(key, data);
            let mut buf = [0u8; ROW_HEADER_SIZE];
            header.encode_into(&mut buf);
            body.extend_from_slice(&buf);
            body.extend_from_slice(key);
            body.extend_from_slice(data);
        }

        let mut file = vec![0u8; FileHeader::encoded_size(userdata.len())];
        let (flags, body_size) = if finalized { (1, body.len() as u64) } else { (0, 0) };
        FileHeader::encode(&mut file, flags, body_size, userdata).unwrap();
        file.extend_from_slice(&body);

        for (footer_type, payload) in footers {
            let header = FooterHeader::for_payload(*footer_type, payload);
            let mut buf = [0u8; FOOTER_HEADER_SIZE];
            header.encode_into(&mut buf);
            file.extend_from_slice(&buf);
            file.extend_from_slice(payload);
        }
        file
    }

    fn reader(file: Vec<u8>) -> SSTableReader<IoCursor<Vec<u8>>> {
        SSTableReader::from_reader(IoCursor::new(file), ReaderOptions::default()).unwrap()
    }

    #[test]
    fn test_read_rows() {
        let file = image(b"meta", &[(b"a", b"1"), (b"b", b"22"), (b"c", b"333")], &[], true);
        let mut reader = reader(file);

        assert!(reader.is_finalized());
        assert_eq!(reader.body_size(), 45);
        assert_eq!(reader.read_header().unwrap().as_ref(), b"meta");
        assert_eq!(reader.count_rows().unwrap(), 3);

        let mut cursor = reader.get_cursor().unwrap();
        let rows: Vec<_> = cursor.rows().collect::<Result<_>>().unwrap();
        assert_eq!(
            rows,
            vec![
                (b"a".to_vec(), b"1".to_vec()),
                (b"b".to_vec(), b"22".to_vec()),
                (b"c".to_vec(), b"333".to_vec()),
            ]
        );
    }

    #[test]
    fn test_cursor_skips_unread_rows() {
        let file = image(b"", &[(b"a", b"1"), (b"bb", b"22"), (b"c", b"333")], &[], true);
        let mut reader = reader(file);
        let mut cursor = reader.get_cursor().unwrap();

        // key only, then nothing, then data only
        assert_eq!(cursor.key().unwrap(), b"a");
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.position(), 14);
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.data().unwrap(), b"333");
        assert_eq!(cursor.key().unwrap(), b"c");
        assert!(!cursor.next().unwrap());
        assert!(!cursor.valid());
        assert!(matches!(cursor.data(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_cursor_seek() {
        let file = image(b"", &[(b"a", b"1"), (b"b", b"22")], &[], true);
        let mut reader = reader(file);
        let mut cursor = reader.get_cursor().unwrap();

        cursor.seek_to(14).unwrap();
        assert_eq!(cursor.read_row().unwrap(), (b"b".to_vec(), b"22".to_vec()));
        assert_eq!(cursor.next_position().unwrap(), 29);

        cursor.seek_to(0).unwrap();
        assert_eq!(cursor.key().unwrap(), b"a");

        assert!(!cursor.try_seek_to(29).unwrap());
        assert!(matches!(cursor.seek_to(29), Err(Error::IndexOutOfBounds { .. })));
    }

    #[test]
    fn test_unfinished_table() {
        let file = image(b"", &[(b"a", b"1"), (b"b", b"22")], &[], false);

        let mut plain = reader(file.clone());
        assert!(!plain.is_finalized());
        assert_eq!(plain.body_size(), 0);
        assert!(!plain.get_cursor().unwrap().valid());

        let options = ReaderOptions { scan_unfinished: true, ..Default::default() };
        let mut scanning = SSTableReader::from_reader(IoCursor::new(file), options).unwrap();
        assert_eq!(scanning.body_size(), 29);
        assert_eq!(scanning.count_rows().unwrap(), 2);
    }

    #[test]
    fn test_read_footers() {
        let file = image(b"", &[(b"a", b"1")], &[(7, b"seven"), (9, b"nine")], true);
        let mut reader = reader(file);

        assert_eq!(reader.read_footer(9).unwrap().as_ref(), b"nine");
        assert_eq!(reader.read_footer(7).unwrap().as_ref(), b"seven");
        assert!(matches!(reader.read_footer(8), Err(Error::NotFound(_))));
        assert!(matches!(reader.read_footer(FOOTER_TYPE_ANY), Err(Error::NotFound(_))));
        assert_eq!(reader.read_footer_optional(8).unwrap(), None);

        let footers = reader.footers().unwrap();
        assert_eq!(footers.len(), 2);
        assert_eq!(footers[0], FooterInfo { footer_type: 7, offset: 44, size: 5 });
        assert_eq!(footers[1].footer_type, 9);
    }

    #[test]
    fn test_footer_checksum_mismatch() {
        let mut file = image(b"", &[(b"a", b"1")], &[(7, b"seven")], true);
        let last = file.len() - 1;
        file[last] ^= 0x01;

        let mut reader = reader(file);
        assert!(matches!(reader.read_footer(7), Err(Error::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_footer_bad_magic() {
        let mut file = image(b"", &[(b"a", b"1")], &[(7, b"seven")], true);
        file[44] ^= 0x01;

        let mut reader = reader(file);
        assert!(matches!(reader.read_footer(7), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_row_checksum_verification() {
        let mut file = image(b"", &[(b"a", b"1")], &[], true);
        let last = file.len() - 1;
        file[last] = b'2';

        let mut verifying = reader(file.clone());
        let mut cursor = verifying.get_cursor().unwrap();
        assert_eq!(cursor.key().unwrap(), b"a");
        assert!(matches!(cursor.data(), Err(Error::ChecksumMismatch { .. })));

        let options = ReaderOptions { verify_checksums: false, ..Default::default() };
        let mut trusting = SSTableReader::from_reader(IoCursor::new(file), options).unwrap();
        assert_eq!(trusting.get_cursor().unwrap().data().unwrap(), b"2");
    }

    #[test]
    fn test_row_exceeding_body_is_corruption() {
        let mut file = image(b"", &[(b"a", b"1"), (b"b", b"2")], &[], true);
        // inflate the second row's data_size
        let second = 30 + 14;
        file[second + 8..second + 12].copy_from_slice(&100u32.to_le_bytes());

        let mut reader = reader(file);
        let mut cursor = reader.get_cursor().unwrap();
        assert!(matches!(cursor.next(), Err(Error::Corruption(_))));
        assert!(!cursor.valid());
    }

    #[test]
    fn test_next_after_checksum_mismatch() {
        let mut file = image(b"", &[(b"a", b"1"), (b"b", b"22")], &[], true);
        // data byte of the first row
        file[30 + 13] = b'9';

        let mut reader = reader(file);
        let mut cursor = reader.get_cursor().unwrap();
        assert!(matches!(cursor.data(), Err(Error::ChecksumMismatch { .. })));
        assert!(matches!(cursor.data(), Err(Error::ChecksumMismatch { .. })));

        assert!(cursor.next().unwrap());
        assert_eq!(cursor.position(), 14);
        assert_eq!(cursor.read_row().unwrap(), (b"b".to_vec(), b"22".to_vec()));
    }

    #[test]
    fn test_body_exceeding_file_is_corruption() {
        let mut file = vec![0u8; FileHeader::encoded_size(0)];
        FileHeader::encode(&mut file, 1, u64::MAX - 5, b"").unwrap();
        let result = SSTableReader::from_reader(IoCursor::new(file), ReaderOptions::default());
        assert!(matches!(result, Err(Error::Corruption(_))));

        let mut file = image(b"", &[(b"a", b"1")], &[], true);
        file.truncate(file.len() - 1);
        let result = SSTableReader::from_reader(IoCursor::new(file), ReaderOptions::default());
        assert!(matches!(result, Err(Error::Corruption(_))));
    }

    #[test]
    fn test_verify() {
        let mut file = image(b"userdata", &[(b"a", b"1")], &[], true);
        assert!(reader(file.clone()).verify().unwrap());

        file[32] ^= 0x20;
        assert!(!reader(file).verify().unwrap());
    }

    #[test]
    fn test_version_1_table() {
        let mut body = Vec::new();
        let header = RowHeader::for_row(b"k", b"v");
        let mut buf = [0u8; ROW_HEADER_SIZE];
        header.encode_into(&mut buf);
        body.extend_from_slice(&buf);
        body.extend_from_slice(b"kv");

        let mut file = vec![0u8; 22 + 2];
        FileHeader::encode_version(&mut file, VERSION_1, 0, body.len() as u64, b"v1").unwrap();
        file.extend_from_slice(&body);

        let mut reader = reader(file);
        assert!(reader.is_finalized());
        assert_eq!(reader.header_size(), 24);
        assert_eq!(reader.read_header().unwrap().as_ref(), b"v1");
        assert_eq!(reader.get_cursor().unwrap().read_row().unwrap(), (b"k".to_vec(), b"v".to_vec()));
    }

    #[test]
    fn test_not_a_table() {
        let result = SSTableReader::from_reader(IoCursor::new(vec![0u8; 64]), ReaderOptions::default());
        assert!(matches!(result, Err(Error::Corruption(_))));
    }
}
