//! In-memory existence checks over a bounded key space.
//!
//! - [`BloomFilter`] - append-only probabilistic membership (no false negatives)
//! - [`Cache`] - TTL map that uses the Bloom filter as a negative pre-check
//!
//! Nothing here is persisted; a restart starts from empty.

mod bloom;
mod ttl;

pub use bloom::{BloomFilter, DEFAULT_FALSE_POSITIVE_RATE};
pub use ttl::Cache;

use thiserror::Error;

/// Errors from constructing cache structures.
#[derive(Debug, Error, PartialEq)]
pub enum BloomError {
    /// The false-positive rate must lie strictly between 0 and 1.
    #[error("invalid false-positive rate {rate}: must be between 0 and 1 exclusive")]
    InvalidFalsePositiveRate {
        /// The rejected rate.
        rate: f64,
    },
}
