//! File header codec.
//!
//! Version 2 (current):
//! ```text
//! [magic: 4B][version: 2B][flags: 8B][body_size: 8B]
//! [userdata_checksum: 4B][userdata_size: 4B][userdata]
//! ```
//!
//! Version 1 has the same layout without the flags field. A version 1 table
//! counts as finalized once its body size is non-zero.

use super::{flags, CURRENT_VERSION, MAGIC, VERSION_1, VERSION_2};
use crate::error::{Error, Result};
use crate::hash::fnv32;
use bytes::{Buf, BufMut};
use std::io::{self, Read};

/// Size of the magic and version fields shared by every version.
const PREFIX_SIZE: usize = 6;

/// Size of body_size, userdata_checksum and userdata_size.
const TRAILER_SIZE: usize = 16;

/// Parsed fixed-size part of the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    version: u16,
    flags: u64,
    body_size: u64,
    userdata_checksum: u32,
    userdata_size: u32,
}

impl FileHeader {
    /// Size of the fixed preamble for the given version.
    pub fn preamble_size(version: u16) -> Result<usize> {
        match version {
            VERSION_1 => Ok(PREFIX_SIZE + TRAILER_SIZE),
            VERSION_2 => Ok(PREFIX_SIZE + 8 + TRAILER_SIZE),
            v => Err(Error::corruption(format!("Unsupported table version: {}", v))),
        }
    }

    /// Size of a current-version header carrying `userdata_size` bytes.
    pub fn encoded_size(userdata_size: usize) -> usize {
        PREFIX_SIZE + 8 + TRAILER_SIZE + userdata_size
    }

    /// Read a header from the start of `reader`.
    ///
    /// Fails with `Corruption` on a bad magic number, an unknown version, or
    /// a stream that ends inside the preamble.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut prefix = [0u8; PREFIX_SIZE];
        read_preamble(reader, &mut prefix)?;

        let mut buf = &prefix[..];
        let magic = buf.get_u32_le();
        if magic != MAGIC {
            return Err(Error::corruption(format!(
                "Not a valid table: expected magic {:#x}, got {:#x}",
                MAGIC, magic
            )));
        }

        let version = buf.get_u16_le();
        let rest_size = Self::preamble_size(version)? - PREFIX_SIZE;
        let mut rest = [0u8; 8 + TRAILER_SIZE];
        read_preamble(reader, &mut rest[..rest_size])?;

        let mut buf = &rest[..rest_size];
        let mut header_flags = if version == VERSION_2 { buf.get_u64_le() } else { 0 };
        let body_size = buf.get_u64_le();
        let userdata_checksum = buf.get_u32_le();
        let userdata_size = buf.get_u32_le();

        // version 1 has no flags; a recorded body size implies finalization
        if version == VERSION_1 && body_size > 0 {
            header_flags |= flags::FINALIZED;
        }

        Ok(Self { version, flags: header_flags, body_size, userdata_checksum, userdata_size })
    }

    /// Decode a header from an in-memory buffer starting at offset 0.
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        Self::read_from(&mut data)
    }

    /// Encode a current-version header with `userdata` into `dst`.
    ///
    /// Returns the number of bytes written.
    pub fn encode(dst: &mut [u8], flags: u64, body_size: u64, userdata: &[u8]) -> Result<usize> {
        Self::encode_version(dst, CURRENT_VERSION, flags, body_size, userdata)
    }

    /// Encode a header of an explicit version into `dst`.
    ///
    /// Version 1 headers drop `flags`.
    pub fn encode_version(
        dst: &mut [u8],
        version: u16,
        flags: u64,
        body_size: u64,
        userdata: &[u8],
    ) -> Result<usize> {
        let userdata_size = u32::try_from(userdata.len())
            .map_err(|_| Error::invalid_argument("Header userdata exceeds 4GB"))?;
        let size = Self::preamble_size(version)? + userdata.len();
        if dst.len() < size {
            return Err(Error::invalid_argument(format!(
                "Header buffer too small: need {} bytes, have {}",
                size,
                dst.len()
            )));
        }

        let mut buf = &mut dst[..size];
        buf.put_u32_le(MAGIC);
        buf.put_u16_le(version);
        if version == VERSION_2 {
            buf.put_u64_le(flags);
        }
        buf.put_u64_le(body_size);
        buf.put_u32_le(fnv32(userdata));
        buf.put_u32_le(userdata_size);
        buf.put_slice(userdata);

        Ok(size)
    }

    /// Record the final body size and the finalized flag in an encoded
    /// header of the given version.
    pub fn finalize_in_place(dst: &mut [u8], version: u16, body_size: u64) -> Result<()> {
        let preamble = Self::preamble_size(version)?;
        if dst.len() < preamble {
            return Err(Error::invalid_argument("Header buffer too small"));
        }

        let mut pos = PREFIX_SIZE;
        if version == VERSION_2 {
            let current = (&dst[pos..pos + 8]).get_u64_le();
            dst[pos..pos + 8].copy_from_slice(&(current | flags::FINALIZED).to_le_bytes());
            pos += 8;
        }
        dst[pos..pos + 8].copy_from_slice(&body_size.to_le_bytes());

        Ok(())
    }

    /// Format version.
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Raw flags (synthesized for version 1).
    pub fn flags(&self) -> u64 {
        self.flags
    }

    /// Body size as recorded on disk; zero until the table is finalized.
    pub fn body_size(&self) -> u64 {
        self.body_size
    }

    /// Stored userdata checksum.
    pub fn userdata_checksum(&self) -> u32 {
        self.userdata_checksum
    }

    /// Userdata length in bytes.
    pub fn userdata_size(&self) -> u64 {
        self.userdata_size as u64
    }

    /// Offset of the first userdata byte.
    pub fn userdata_offset(&self) -> u64 {
        // version was validated when the header was decoded
        Self::preamble_size(self.version).map(|s| s as u64).unwrap_or(0)
    }

    /// Total header size: preamble plus userdata. Also the body offset.
    pub fn header_size(&self) -> u64 {
        self.userdata_offset() + self.userdata_size()
    }

    /// True if the table has been finalized.
    pub fn is_finalized(&self) -> bool {
        self.flags & flags::FINALIZED != 0
    }

    /// True if the userdata lies within a file of `file_size` bytes.
    pub fn userdata_fits(&self, file_size: u64) -> bool {
        self.userdata_offset() + self.userdata_size() <= file_size
    }

    /// Check the stored userdata checksum against `userdata`.
    pub fn verify_userdata(&self, userdata: &[u8]) -> bool {
        if self.userdata_size == 0 {
            return true;
        }

        userdata.len() as u64 == self.userdata_size() && fnv32(userdata) == self.userdata_checksum
    }

    /// Verify the header against the complete file contents `file`.
    ///
    /// False if the userdata doesn't fit into the file or its checksum does
    /// not match.
    pub fn verify(&self, file: &[u8]) -> bool {
        if !self.userdata_fits(file.len() as u64) {
            return false;
        }

        let start = self.userdata_offset() as usize;
        let end = start + self.userdata_size as usize;
        self.verify_userdata(&file[start..end])
    }
}

fn read_preamble<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            Err(Error::corruption("File too small to contain a table header"))
        }
        Err(e) => Err(Error::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_v2(flags: u64, body_size: u64, userdata: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; FileHeader::encoded_size(userdata.len())];
        let n = FileHeader::encode(&mut buf, flags, body_size, userdata).unwrap();
        assert_eq!(n, buf.len());
        buf
    }

    #[test]
    fn test_preamble_sizes() {
        assert_eq!(FileHeader::preamble_size(VERSION_1).unwrap(), 22);
        assert_eq!(FileHeader::preamble_size(VERSION_2).unwrap(), 30);
        assert!(FileHeader::preamble_size(3).is_err());
        assert_eq!(FileHeader::encoded_size(10), 40);
    }

    #[test]
    fn test_v2_layout() {
        let buf = encode_v2(0, 0, b"hello");

        assert_eq!(&buf[0..4], &MAGIC.to_le_bytes());
        assert_eq!(&buf[4..6], &2u16.to_le_bytes());
        assert_eq!(&buf[6..14], &0u64.to_le_bytes());
        assert_eq!(&buf[14..22], &0u64.to_le_bytes());
        assert_eq!(&buf[22..26], &fnv32(b"hello").to_le_bytes());
        assert_eq!(&buf[26..30], &5u32.to_le_bytes());
        assert_eq!(&buf[30..], b"hello");

        let header = FileHeader::decode(&buf).unwrap();
        assert_eq!(header.version(), VERSION_2);
        assert_eq!(header.userdata_offset(), 30);
        assert_eq!(header.header_size(), 35);
        assert_eq!(header.body_size(), 0);
        assert!(!header.is_finalized());
        assert!(header.verify(&buf));
    }

    #[test]
    fn test_v1_finalized_flag_is_synthesized() {
        let mut buf = vec![0u8; 22 + 3];
        FileHeader::encode_version(&mut buf, VERSION_1, 0, 128, b"abc").unwrap();

        let header = FileHeader::decode(&buf).unwrap();
        assert_eq!(header.version(), VERSION_1);
        assert_eq!(header.userdata_offset(), 22);
        assert_eq!(header.body_size(), 128);
        assert!(header.is_finalized());

        FileHeader::encode_version(&mut buf, VERSION_1, 0, 0, b"abc").unwrap();
        assert!(!FileHeader::decode(&buf).unwrap().is_finalized());
    }

    #[test]
    fn test_bad_magic_and_version() {
        let mut buf = encode_v2(0, 0, b"");
        buf[0] ^= 0x01;
        assert!(matches!(FileHeader::decode(&buf), Err(Error::Corruption(_))));

        let mut buf = encode_v2(0, 0, b"");
        buf[4..6].copy_from_slice(&7u16.to_le_bytes());
        assert!(matches!(FileHeader::decode(&buf), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_truncated_header() {
        let buf = encode_v2(0, 0, b"");
        assert!(matches!(FileHeader::decode(&buf[..20]), Err(Error::Corruption(_))));
        assert!(matches!(FileHeader::decode(&buf[..3]), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_verify_detects_flipped_userdata() {
        let mut buf = encode_v2(0, 0, b"userdata");
        let header = FileHeader::decode(&buf).unwrap();
        assert!(header.verify(&buf));

        buf[32] ^= 0x40;
        assert!(!header.verify(&buf));
    }

    #[test]
    fn test_verify_detects_truncated_userdata() {
        let buf = encode_v2(0, 0, b"userdata");
        let header = FileHeader::decode(&buf).unwrap();
        assert!(!header.verify(&buf[..buf.len() - 1]));
    }

    #[test]
    fn test_verify_empty_userdata() {
        let buf = encode_v2(0, 0, b"");
        let header = FileHeader::decode(&buf).unwrap();
        assert!(header.verify(&buf));
    }

    #[test]
    fn test_finalize_in_place() {
        let mut buf = encode_v2(0, 0, b"meta");
        FileHeader::finalize_in_place(&mut buf, VERSION_2, 4096).unwrap();

        let header = FileHeader::decode(&buf).unwrap();
        assert!(header.is_finalized());
        assert_eq!(header.body_size(), 4096);
        assert!(header.verify(&buf));

        let mut buf = vec![0u8; 22];
        FileHeader::encode_version(&mut buf, VERSION_1, 0, 0, b"").unwrap();
        FileHeader::finalize_in_place(&mut buf, VERSION_1, 12).unwrap();
        let header = FileHeader::decode(&buf).unwrap();
        assert!(header.is_finalized());
        assert_eq!(header.body_size(), 12);
    }
}
