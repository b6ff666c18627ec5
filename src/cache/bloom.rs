//! Append-only Bloom filter with double hashing.

use std::f64::consts::LN_2;
use std::sync::{PoisonError, RwLock};

use super::BloomError;

/// Default target false-positive rate.
pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.01;

/// Salt appended to the key for the second hash.
const SECOND_HASH_SALT: &[u8] = b"imagecapture";

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Probabilistic set membership with no false negatives.
///
/// The bit array is sized from the expected item count and target
/// false-positive rate:
///
/// ```text
/// m = ceil(-n * ln(p) / ln(2)^2)
/// k = ceil(m / n * ln(2))
/// ```
///
/// The `k` probe positions are `h1 + i * h2 (mod m)` where `h1` and `h2` are
/// 64-bit FNV-1 hashes of the key and of the salted key.
///
/// Bits are only ever set by [`add`](Self::add); [`clear`](Self::clear) is the
/// sole way to unset them.
#[derive(Debug)]
pub struct BloomFilter {
    bits: RwLock<Vec<u64>>,
    size: u64,
    hash_funcs: u64,
}

impl BloomFilter {
    /// Creates a filter for `expected_items` keys at the given false-positive rate.
    ///
    /// # Errors
    ///
    /// Returns [`BloomError::InvalidFalsePositiveRate`] unless `0 < rate < 1`.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Result<Self, BloomError> {
        if !(false_positive_rate > 0.0 && false_positive_rate < 1.0) {
            return Err(BloomError::InvalidFalsePositiveRate {
                rate: false_positive_rate,
            });
        }
        Ok(Self::from_parameters(expected_items, false_positive_rate))
    }

    /// Creates a filter for `expected_items` keys at the default 1% rate.
    #[must_use]
    pub fn with_capacity(expected_items: usize) -> Self {
        Self::from_parameters(expected_items, DEFAULT_FALSE_POSITIVE_RATE)
    }

    fn from_parameters(expected_items: usize, false_positive_rate: f64) -> Self {
        let n = expected_items.max(1) as u64;
        let size = optimal_size(n, false_positive_rate);
        let hash_funcs = optimal_hash_funcs(size, n);
        let words = usize::try_from(size.div_ceil(64)).unwrap_or(usize::MAX);
        Self {
            bits: RwLock::new(vec![0; words]),
            size,
            hash_funcs,
        }
    }

    /// Number of bits in the filter.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of probe positions per key.
    #[must_use]
    pub fn hash_funcs(&self) -> u64 {
        self.hash_funcs
    }

    /// Marks `item` as present.
    pub fn add(&self, item: &str) {
        let (h1, h2) = hash_pair(item);
        let mut bits = self.bits.write().unwrap_or_else(PoisonError::into_inner);
        for i in 0..self.hash_funcs {
            let (word, mask) = self.position(h1, h2, i);
            bits[word] |= mask;
        }
    }

    /// Returns false if `item` was definitely never added.
    #[must_use]
    pub fn contains(&self, item: &str) -> bool {
        let (h1, h2) = hash_pair(item);
        let bits = self.bits.read().unwrap_or_else(PoisonError::into_inner);
        (0..self.hash_funcs).all(|i| {
            let (word, mask) = self.position(h1, h2, i);
            bits[word] & mask != 0
        })
    }

    /// Resets every bit.
    pub fn clear(&self) {
        let mut bits = self.bits.write().unwrap_or_else(PoisonError::into_inner);
        bits.fill(0);
    }

    #[allow(clippy::cast_possible_truncation)]
    fn position(&self, h1: u64, h2: u64, i: u64) -> (usize, u64) {
        let index = h1.wrapping_add(i.wrapping_mul(h2)) % self.size;
        ((index / 64) as usize, 1 << (index % 64))
    }
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn optimal_size(n: u64, p: f64) -> u64 {
    let m = (-(n as f64) * p.ln() / (LN_2 * LN_2)).ceil();
    (m as u64).max(1)
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn optimal_hash_funcs(size: u64, n: u64) -> u64 {
    let k = (size as f64 / n as f64 * LN_2).ceil();
    (k as u64).max(1)
}

fn hash_pair(item: &str) -> (u64, u64) {
    let h1 = fnv1_64(&[item.as_bytes()]);
    let h2 = fnv1_64(&[item.as_bytes(), SECOND_HASH_SALT]);
    (h1, h2)
}

fn fnv1_64(parts: &[&[u8]]) -> u64 {
    parts
        .iter()
        .flat_map(|part| part.iter())
        .fold(FNV_OFFSET_BASIS, |hash, byte| {
            hash.wrapping_mul(FNV_PRIME) ^ u64::from(*byte)
        })
}
