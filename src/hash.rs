//! FNV-1a 32-bit hashing.
//!
//! Every checksum in the file format (row checksums, footer checksums and
//! the header userdata checksum) is a plain 32-bit FNV-1a over the covered
//! bytes.

use std::hash::Hasher;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Hash a byte slice with 32-bit FNV-1a.
pub fn fnv32(data: &[u8]) -> u32 {
    let mut hasher = Fnv32::new();
    hasher.update(data);
    hasher.value()
}

/// Streaming FNV-1a hasher.
///
/// Feeding the input in several `update` calls yields the same value as one
/// call over the concatenation, which lets a row checksum be computed from
/// its header fields, key and data without copying them together first.
#[derive(Debug, Clone, Copy)]
pub struct Fnv32 {
    state: u32,
}

impl Fnv32 {
    /// Create a hasher starting from the standard offset basis.
    pub fn new() -> Self {
        Self { state: FNV_OFFSET_BASIS }
    }

    /// Create a hasher whose start state is perturbed by `seed`.
    pub fn with_seed(seed: u32) -> Self {
        Self { state: FNV_OFFSET_BASIS ^ seed }
    }

    /// Feed bytes into the hash.
    pub fn update(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= byte as u32;
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
    }

    /// Current hash value.
    pub fn value(&self) -> u32 {
        self.state
    }
}

impl Default for Fnv32 {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for Fnv32 {
    fn finish(&self) -> u64 {
        self.state as u64
    }

    fn write(&mut self, bytes: &[u8]) {
        self.update(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        // Reference values for 32-bit FNV-1a.
        assert_eq!(fnv32(b""), 0x811c9dc5);
        assert_eq!(fnv32(b"a"), 0xe40c292c);
        assert_eq!(fnv32(b"foobar"), 0xbf9cf968);
    }

    #[test]
    fn test_streaming_matches_oneshot() {
        let mut hasher = Fnv32::new();
        hasher.update(b"foo");
        hasher.update(b"bar");
        assert_eq!(hasher.value(), fnv32(b"foobar"));
    }

    #[test]
    fn test_seed_changes_hash() {
        let mut seeded = Fnv32::with_seed(1);
        seeded.update(b"test");
        assert_ne!(seeded.value(), fnv32(b"test"));
    }
}
