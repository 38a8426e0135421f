//! Bloom filter index.
//!
//! A space-efficient probabilistic set of the keys stored in a table. False
//! positive matches are possible, but false negatives are not.

use super::{Index, FOOTER_TYPE_BLOOM};
use crate::error::{Error, Result};
use crate::hash::Fnv32;
use bytes::Buf;

/// Default bits per key for bloom filter
const DEFAULT_BITS_PER_KEY: usize = 10;

/// Upper bound on the number of hash functions.
const MAX_HASHES: u32 = 30;

/// Size of the encoded parameters: num_hashes (4B) + num_bits (8B).
const ENCODED_HEADER_SIZE: usize = 12;

/// Bloom filter over every appended key.
///
/// # Example
/// ```
/// use sstfile::index::{BloomFilterIndex, Index};
///
/// let mut filter = BloomFilterIndex::new(1000, 0.01);
/// filter.add_row(0, b"key1", b"value1");
///
/// assert!(filter.may_contain(b"key1"));
/// ```
#[derive(Debug, Clone)]
pub struct BloomFilterIndex {
    /// Bit array for the bloom filter
    bits: Vec<u8>,
    /// Number of hash functions to use
    num_hashes: u32,
    /// Number of bits in the filter
    num_bits: usize,
}

impl BloomFilterIndex {
    /// Create a filter sized for `expected_keys` at the given false positive
    /// rate.
    pub fn new(expected_keys: usize, false_positive_rate: f64) -> Self {
        if expected_keys == 0 {
            return Self::with_bits_and_hashes(64, 1);
        }

        // m = -n * ln(p) / (ln(2)^2)
        let num_bits = Self::optimal_num_bits(expected_keys, false_positive_rate);
        // k = (m/n) * ln(2)
        let num_hashes = Self::optimal_num_hashes(num_bits, expected_keys);

        Self::with_bits_and_hashes(num_bits, num_hashes)
    }

    /// Create a filter with a specific number of bits per key.
    pub fn with_bits_per_key(num_keys: usize, bits_per_key: usize) -> Self {
        let num_bits = (num_keys * bits_per_key).max(64);
        let num_hashes = ((bits_per_key as f64) * 0.69).round() as u32;

        Self::with_bits_and_hashes(num_bits, num_hashes.clamp(1, MAX_HASHES))
    }

    /// Create a filter with 10 bits per key.
    pub fn default_with_keys(num_keys: usize) -> Self {
        Self::with_bits_per_key(num_keys, DEFAULT_BITS_PER_KEY)
    }

    fn with_bits_and_hashes(num_bits: usize, num_hashes: u32) -> Self {
        Self { bits: vec![0u8; num_bits.div_ceil(8)], num_hashes, num_bits }
    }

    fn optimal_num_bits(expected_keys: usize, false_positive_rate: f64) -> usize {
        let n = expected_keys as f64;
        let p = false_positive_rate.clamp(0.0001, 0.9999);

        let num_bits = (-n * p.ln() / (2.0_f64.ln().powi(2))).ceil() as usize;
        num_bits.max(64)
    }

    fn optimal_num_hashes(num_bits: usize, expected_keys: usize) -> u32 {
        let k = ((num_bits as f64 / expected_keys as f64) * 2.0_f64.ln()).ceil() as u32;
        k.clamp(1, MAX_HASHES)
    }

    /// The two base hashes of a key. Bit `i` is `h1 + i * h2` (double hashing).
    fn base_hashes(key: &[u8]) -> (u32, u32) {
        (Self::hash_with_seed(key, 0xbc9f1d34), Self::hash_with_seed(key, 0xd0e89c7b))
    }

    fn bit_position(&self, hash1: u32, hash2: u32, i: u32) -> usize {
        (hash1.wrapping_add(i.wrapping_mul(hash2)) as usize) % self.num_bits
    }

    /// Seeded FNV-1a followed by the murmur3 finalizer, which spreads
    /// differences in the last key bytes over all output bits.
    fn hash_with_seed(key: &[u8], seed: u32) -> u32 {
        let mut hasher = Fnv32::with_seed(seed);
        hasher.update(key);

        let mut h = hasher.value();
        h ^= h >> 16;
        h = h.wrapping_mul(0x85eb_ca6b);
        h ^= h >> 13;
        h = h.wrapping_mul(0xc2b2_ae35);
        h ^ (h >> 16)
    }

    /// Add a key to the filter.
    pub fn insert(&mut self, key: &[u8]) {
        let (hash1, hash2) = Self::base_hashes(key);
        for i in 0..self.num_hashes {
            let pos = self.bit_position(hash1, hash2, i);
            self.bits[pos / 8] |= 1 << (pos % 8);
        }
    }

    /// True if the key might be in the table; false if it definitely isn't.
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let (hash1, hash2) = Self::base_hashes(key);
        (0..self.num_hashes).all(|i| {
            let pos = self.bit_position(hash1, hash2, i);
            self.bits[pos / 8] & (1 << (pos % 8)) != 0
        })
    }

    /// Size of the bit array in bytes.
    pub fn size(&self) -> usize {
        self.bits.len()
    }

    /// Number of hash functions used.
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Number of bits in the filter.
    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    /// Theoretical false positive rate after `num_keys` insertions:
    /// p = (1 - e^(-kn/m))^k
    pub fn estimated_false_positive_rate(&self, num_keys: usize) -> f64 {
        if num_keys == 0 {
            return 0.0;
        }

        let k = self.num_hashes as f64;
        let n = num_keys as f64;
        let m = self.num_bits as f64;

        (1.0 - (-k * n / m).exp()).powf(k)
    }

    /// Decode a filter from a footer payload.
    ///
    /// Format:
    /// [num_hashes: 4 bytes][num_bits: 8 bytes][bits: variable]
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        if data.len() < ENCODED_HEADER_SIZE {
            return Err(Error::corruption("Bloom filter data too short"));
        }

        let num_hashes = data.get_u32_le();
        let num_bits = data.get_u64_le();

        if !(1..=MAX_HASHES).contains(&num_hashes) {
            return Err(Error::corruption(format!("Bloom filter with {} hash functions", num_hashes)));
        }

        let num_bits = usize::try_from(num_bits)
            .map_err(|_| Error::corruption("Bloom filter size mismatch"))?;
        if num_bits == 0 || data.len() != num_bits.div_ceil(8) {
            return Err(Error::corruption("Bloom filter size mismatch"));
        }

        Ok(Self { bits: data.to_vec(), num_hashes, num_bits })
    }
}

impl Index for BloomFilterIndex {
    fn footer_type(&self) -> u32 {
        FOOTER_TYPE_BLOOM
    }

    fn add_row(&mut self, _body_offset: u64, key: &[u8], _data: &[u8]) {
        self.insert(key);
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let mut encoded = Vec::with_capacity(ENCODED_HEADER_SIZE + self.bits.len());
        encoded.extend_from_slice(&self.num_hashes.to_le_bytes());
        encoded.extend_from_slice(&(self.num_bits as u64).to_le_bytes());
        encoded.extend_from_slice(&self.bits);
        Ok(encoded)
    }
}
