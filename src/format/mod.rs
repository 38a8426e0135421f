//! On-disk binary layout.
//!
//! All integers are little-endian.
//!
//! ## File Format
//!
//! ```text
//! [File Header]       // magic, version, flags, body_size, userdata
//! [Row 1]             // one page per row
//! [Row 2]
//! ...
//! [Row N]
//! [Footer Block 1]    // typed, checksummed metadata (serialized indexes)
//! ...
//! [Footer Block M]
//! ```
//!
//! ## Row Format
//!
//! ```text
//! [checksum: 4B][key_size: 4B][data_size: 4B][key][data]
//! ```
//!
//! The checksum is a 32-bit FNV-1a over everything after the checksum field.
//!
//! ## Footer Block Format
//!
//! ```text
//! [magic: 4B][type: 4B][footer_size: 4B][footer_checksum: 4B][payload]
//! ```
//!
//! Footer blocks are discovered by scanning forward from the end of the body
//! region until end-of-file.

pub mod header;

pub use header::FileHeader;

use crate::error::{Error, Result};
use crate::hash::Fnv32;
use bytes::{Buf, BufMut};

/// Magic number found at offset 0 of every table and at the start of every
/// footer block.
pub const MAGIC: u32 = 0x5353_1a4b;

/// First format version. Has no flags field.
pub const VERSION_1: u16 = 1;

/// Current format version, written by every editor.
pub const VERSION_2: u16 = 2;

/// Version written by new tables.
pub const CURRENT_VERSION: u16 = VERSION_2;

/// Size of a row header: checksum + key_size + data_size.
pub const ROW_HEADER_SIZE: usize = 12;

/// Size of a footer block header: magic + type + size + checksum.
pub const FOOTER_HEADER_SIZE: usize = 16;

/// Footer type that never names a real footer block.
pub const FOOTER_TYPE_ANY: u32 = 0;

/// Bits of the header flags field.
pub mod flags {
    /// The table was finalized and is immutable.
    pub const FINALIZED: u64 = 1;
}

/// Header preceding every row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowHeader {
    /// FNV-1a over key_size, data_size, key and data.
    pub checksum: u32,
    /// Length of the key in bytes.
    pub key_size: u32,
    /// Length of the data in bytes.
    pub data_size: u32,
}

impl RowHeader {
    /// Build the header for a row, computing its checksum.
    pub fn for_row(key: &[u8], data: &[u8]) -> Self {
        let key_size = key.len() as u32;
        let data_size = data.len() as u32;
        Self { checksum: Self::compute_checksum(key_size, data_size, key, data), key_size, data_size }
    }

    /// Checksum over the row bytes following the checksum field.
    pub fn compute_checksum(key_size: u32, data_size: u32, key: &[u8], data: &[u8]) -> u32 {
        let mut fnv = Fnv32::new();
        fnv.update(&key_size.to_le_bytes());
        fnv.update(&data_size.to_le_bytes());
        fnv.update(key);
        fnv.update(data);
        fnv.value()
    }

    /// Total size of the row page: header, key and data.
    pub fn row_size(&self) -> u64 {
        ROW_HEADER_SIZE as u64 + self.key_size as u64 + self.data_size as u64
    }

    /// Write the header into the first `ROW_HEADER_SIZE` bytes of `dst`.
    pub fn encode_into(&self, dst: &mut [u8]) {
        let mut buf = &mut dst[..ROW_HEADER_SIZE];
        buf.put_u32_le(self.checksum);
        buf.put_u32_le(self.key_size);
        buf.put_u32_le(self.data_size);
    }

    /// Decode a header from the first `ROW_HEADER_SIZE` bytes of `src`.
    pub fn decode(mut src: &[u8]) -> Result<Self> {
        if src.len() < ROW_HEADER_SIZE {
            return Err(Error::corruption(format!("Row header too short: {} bytes", src.len())));
        }

        Ok(Self { checksum: src.get_u32_le(), key_size: src.get_u32_le(), data_size: src.get_u32_le() })
    }

    /// Check the stored checksum against the row contents.
    pub fn verify(&self, key: &[u8], data: &[u8]) -> Result<()> {
        let actual = Self::compute_checksum(self.key_size, self.data_size, key, data);
        if actual != self.checksum {
            return Err(Error::ChecksumMismatch { expected: self.checksum, actual });
        }
        Ok(())
    }
}

/// Header preceding every footer block payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FooterHeader {
    /// Always `MAGIC`.
    pub magic: u32,
    /// Caller-chosen footer type, never `FOOTER_TYPE_ANY`.
    pub footer_type: u32,
    /// Payload length in bytes.
    pub footer_size: u32,
    /// FNV-1a over the payload.
    pub footer_checksum: u32,
}

impl FooterHeader {
    /// Build the header for a payload, computing its checksum.
    pub fn for_payload(footer_type: u32, payload: &[u8]) -> Self {
        Self {
            magic: MAGIC,
            footer_type,
            footer_size: payload.len() as u32,
            footer_checksum: crate::hash::fnv32(payload),
        }
    }

    /// Write the header into the first `FOOTER_HEADER_SIZE` bytes of `dst`.
    pub fn encode_into(&self, dst: &mut [u8]) {
        let mut buf = &mut dst[..FOOTER_HEADER_SIZE];
        buf.put_u32_le(self.magic);
        buf.put_u32_le(self.footer_type);
        buf.put_u32_le(self.footer_size);
        buf.put_u32_le(self.footer_checksum);
    }

    /// Decode a header from `src`, rejecting a bad magic number.
    pub fn decode(mut src: &[u8]) -> Result<Self> {
        if src.len() < FOOTER_HEADER_SIZE {
            return Err(Error::corruption(format!("Footer header too short: {} bytes", src.len())));
        }

        let header = Self {
            magic: src.get_u32_le(),
            footer_type: src.get_u32_le(),
            footer_size: src.get_u32_le(),
            footer_checksum: src.get_u32_le(),
        };

        if header.magic != MAGIC {
            return Err(Error::corruption(format!(
                "Invalid footer magic number: expected {:#x}, got {:#x}",
                MAGIC, header.magic
            )));
        }

        Ok(header)
    }

    /// Check the stored checksum against the payload.
    pub fn verify(&self, payload: &[u8]) -> Result<()> {
        let actual = crate::hash::fnv32(payload);
        if actual != self.footer_checksum {
            return Err(Error::ChecksumMismatch { expected: self.footer_checksum, actual });
        }
        Ok(())
    }
}
