//! Fluent, validated construction.
//!
//! Invalid configuration fails `finish()` with a [`ConfigError`]; no
//! partially constructed filter is ever observable. Construction either
//! fully succeeds or produces nothing.

use std::hash::Hash;

use crate::error::ConfigError;
use crate::filter::{CuckooFilter, BUCKET_SIZE};
use crate::hash::{hasher_from_salts, Algorithm, Funnel, HashFunnel, ItemHasher};
use crate::sync::Arc;

const DEFAULT_FALSE_POSITIVE_PROBABILITY: f64 = 0.01;
const DEFAULT_EXPECTED_CONCURRENCY: usize = 16;

/// Average load factor a 4-slot-bucket table sustains before insert failures
/// become frequent (the value from the original cuckoo filter paper's
/// bucket-size-4 row).
const LOAD_FACTOR: f64 = 0.955;

/// Builds a [`CuckooFilter`]. Every setter returns `Self` so calls chain;
/// [`Self::finish`] is the only fallible step.
///
/// ```
/// use cuckoo_filter::CuckooFilterBuilder;
///
/// let filter = CuckooFilterBuilder::<String>::new(10_000)
///     .false_positive_probability(0.001)
///     .expected_concurrency(32)
///     .finish()
///     .unwrap();
/// ```
pub struct CuckooFilterBuilder<T: Hash + 'static> {
    max_keys: u64,
    fpp: f64,
    algorithm: Algorithm,
    expected_concurrency: usize,
    hasher: Option<Arc<dyn ItemHasher>>,
    funnel: Option<Arc<dyn Funnel<T> + Send + Sync>>,
}

impl<T: Hash + 'static> CuckooFilterBuilder<T> {
    /// `max_keys` is the number of distinct items the filter is sized for,
    /// not a hard cap. Inserting more is possible but pushes the load
    /// factor up and the eviction cascade's success rate down.
    pub fn new(max_keys: u64) -> Self {
        Self {
            max_keys,
            fpp: DEFAULT_FALSE_POSITIVE_PROBABILITY,
            algorithm: Algorithm::Murmur3_128,
            expected_concurrency: DEFAULT_EXPECTED_CONCURRENCY,
            hasher: None,
            funnel: None,
        }
    }

    pub fn false_positive_probability(mut self, fpp: f64) -> Self {
        self.fpp = fpp;
        self
    }

    /// Selects one of the five stable backends when no custom
    /// [`Self::hasher`] is supplied.
    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Segment count is `2 * expected_concurrency`; must be a power of two.
    pub fn expected_concurrency(mut self, expected_concurrency: usize) -> Self {
        self.expected_concurrency = expected_concurrency;
        self
    }

    /// Overrides the hasher implied by [`Self::algorithm`]. Useful to pin a
    /// specific salt, e.g. for reproducible tests.
    pub fn hasher(mut self, hasher: impl ItemHasher + 'static) -> Self {
        self.hasher = Some(Arc::new(hasher));
        self
    }

    /// Overrides the default `Hash`-derived byte encoding. Needed when two
    /// logically-equal items must funnel to identical bytes but don't share
    /// a `Hash` impl that guarantees it.
    pub fn funnel(mut self, funnel: impl Funnel<T> + Send + Sync + 'static) -> Self {
        self.funnel = Some(Arc::new(funnel));
        self
    }

    /// Validates the configuration and builds the filter, or returns the
    /// first [`ConfigError`] encountered.
    pub fn finish(self) -> Result<CuckooFilter<T>, ConfigError> {
        if self.max_keys <= 1 {
            return Err(ConfigError::MaxKeysTooSmall(self.max_keys));
        }
        if !(self.fpp > 0.0 && self.fpp < 0.25) {
            return Err(ConfigError::InvalidFalsePositiveProbability(self.fpp));
        }
        if !self.expected_concurrency.is_power_of_two() {
            return Err(ConfigError::ConcurrencyNotPowerOfTwo(self.expected_concurrency));
        }

        let tag_bits = compute_tag_bits(self.fpp);
        if !(5..=48).contains(&tag_bits) {
            return Err(ConfigError::TagBitsOutOfRange(tag_bits));
        }

        let num_buckets = compute_num_buckets(self.max_keys, tag_bits);
        let index_bits = num_buckets.trailing_zeros();

        let hasher: Arc<dyn ItemHasher> =
            self.hasher.unwrap_or_else(|| hasher_from_salts(self.algorithm, (0, 0)));
        let hash_len = hasher.algorithm().hash_len();
        if hash_len < tag_bits + index_bits {
            return Err(ConfigError::HashTooShortForTable { hash_len, tag_bits, index_bits });
        }

        let funnel: Arc<dyn Funnel<T> + Send + Sync> =
            self.funnel.unwrap_or_else(|| Arc::new(HashFunnel));

        Ok(CuckooFilter::from_parts(
            num_buckets,
            tag_bits,
            self.expected_concurrency,
            hasher,
            funnel,
            self.max_keys,
            self.fpp,
        ))
    }
}

/// `ceil(log2((1/fpp) + 3) / LOAD_FACTOR)`, clamped to nothing (callers
/// check the `[5, 48]` range themselves). This is the fingerprint width a
/// 4-slot bucket needs to keep the false-positive probability at or below
/// `fpp` at the target load factor.
fn compute_tag_bits(fpp: f64) -> u32 {
    let raw = (((1.0 / fpp) + 3.0).log2() / LOAD_FACTOR).ceil();
    raw.max(0.0) as u32
}

/// Smallest power of two `>= ceil(max_keys / (LOAD_FACTOR * BUCKET_SIZE))`.
fn compute_num_buckets(max_keys: u64, _tag_bits: u32) -> u64 {
    let needed = (max_keys as f64 / (LOAD_FACTOR * BUCKET_SIZE as f64)).ceil() as u64;
    needed.max(1).next_power_of_two()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Murmur3_32Hasher;

    #[test]
    fn rejects_max_keys_of_zero_or_one() {
        assert_eq!(
            CuckooFilterBuilder::<u64>::new(1).finish().unwrap_err(),
            ConfigError::MaxKeysTooSmall(1)
        );
        assert_eq!(
            CuckooFilterBuilder::<u64>::new(0).finish().unwrap_err(),
            ConfigError::MaxKeysTooSmall(0)
        );
    }

    #[test]
    fn rejects_out_of_range_false_positive_probability() {
        assert!(matches!(
            CuckooFilterBuilder::<u64>::new(1_000)
                .false_positive_probability(0.0)
                .finish(),
            Err(ConfigError::InvalidFalsePositiveProbability(_))
        ));
        assert!(matches!(
            CuckooFilterBuilder::<u64>::new(1_000)
                .false_positive_probability(0.5)
                .finish(),
            Err(ConfigError::InvalidFalsePositiveProbability(_))
        ));
    }

    #[test]
    fn rejects_non_power_of_two_concurrency() {
        assert_eq!(
            CuckooFilterBuilder::<u64>::new(1_000)
                .expected_concurrency(3)
                .finish()
                .unwrap_err(),
            ConfigError::ConcurrencyNotPowerOfTwo(3)
        );
    }

    #[test]
    fn rejects_hash_too_short_for_table() {
        let err = CuckooFilterBuilder::<u64>::new(1_000_000_000)
            .hasher(Murmur3_32Hasher::new(0))
            .false_positive_probability(0.0001)
            .finish()
            .unwrap_err();
        assert!(matches!(err, ConfigError::HashTooShortForTable { .. }));
    }

    #[test]
    fn rejects_tag_bits_above_forty_eight() {
        let err = CuckooFilterBuilder::<u64>::new(1_000)
            .false_positive_probability(1e-15)
            .finish()
            .unwrap_err();
        assert!(matches!(err, ConfigError::TagBitsOutOfRange(bits) if bits > 48));
    }

    #[test]
    fn default_configuration_builds_successfully() {
        let filter = CuckooFilterBuilder::<u64>::new(10_000).finish().unwrap();
        assert!(filter.get_actual_capacity() > 0);
    }

    #[test]
    fn smaller_false_positive_probability_grows_tag_bits() {
        assert!(compute_tag_bits(0.01) < compute_tag_bits(0.0001));
    }

    #[test]
    fn num_buckets_is_always_a_power_of_two() {
        for max_keys in [1u64, 2, 100, 1_000, 1_000_000] {
            assert!(compute_num_buckets(max_keys, 8).is_power_of_two());
        }
    }
}
