//! Configuration errors.
//!
//! Only construction can fail: runtime operations never throw for "normal"
//! full conditions, they return a `bool` instead.

use thiserror::Error;

/// Raised by [`crate::CuckooFilterBuilder::finish`] when the requested
/// parameters cannot produce a valid filter.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("max_keys must be greater than 1, got {0}")]
    MaxKeysTooSmall(u64),

    #[error("false_positive_probability must be in (0, 0.25), got {0}")]
    InvalidFalsePositiveProbability(f64),

    #[error("expected_concurrency must be a power of two, got {0}")]
    ConcurrencyNotPowerOfTwo(usize),

    #[error(
        "hash length {hash_len} bits is too short for tagBits={tag_bits} + indexBits={index_bits}"
    )]
    HashTooShortForTable { hash_len: u32, tag_bits: u32, index_bits: u32 },

    #[error("computed tagBits={0} is out of the supported range [5, 48]")]
    TagBitsOutOfRange(u32),
}
