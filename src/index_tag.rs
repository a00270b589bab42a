//! Fingerprint and bucket-index derivation.

use crate::hash::{ItemHasher, MURMUR3_FINALIZER_K};

/// Number of zero-tag rehash attempts after which a broken hash function is
/// assumed and the operation panics.
const ZERO_TAG_REHASH_ASSERTION_LIMIT: u64 = 100;
/// Hard ceiling; if even the assertion limit did not already panic (it
/// always does, first) this bounds the loop so it provably terminates.
const ZERO_TAG_REHASH_HARD_LIMIT: u64 = 10_000;

/// Derives `(bucketIndex, tag)` pairs from item bytes and computes alternate
/// bucket indices. `numBuckets` must be a power of two, since `alt_index`'s
/// involution property depends on it.
pub(crate) struct IndexTagCalc {
    num_buckets: u64,
    bucket_mask: u64,
    tag_bits: u32,
    tag_mask: u64,
}

impl IndexTagCalc {
    pub(crate) fn new(num_buckets: u64, tag_bits: u32) -> Self {
        debug_assert!(num_buckets.is_power_of_two());
        debug_assert!((5..=64).contains(&tag_bits));
        Self {
            num_buckets,
            bucket_mask: num_buckets - 1,
            tag_bits,
            tag_mask: if tag_bits == 64 { u64::MAX } else { (1u64 << tag_bits) - 1 },
        }
    }

    /// `generate(item) -> (bucketIndex, tag)`. `bytes` is the funneled item.
    pub(crate) fn generate(&self, hasher: &dyn ItemHasher, bytes: &[u8]) -> (u64, u64) {
        let hash_len = hasher.algorithm().hash_len();

        let (bucket_index, mut tag) = if hash_len <= 32 {
            let h = hasher.hash64(0, bytes) & 0xffff_ffff;
            (self.bucket_index_from_high_bits(h), h & self.tag_mask)
        } else if hash_len <= 64 {
            let h = hasher.hash64(0, bytes);
            (self.bucket_index_from_high_bits(h), h & self.tag_mask)
        } else {
            let (tag_word, index_word) = hasher.hash128(0, bytes);
            (index_word & self.bucket_mask, tag_word & self.tag_mask)
        };

        let mut attempt = 0u64;
        while tag == 0 {
            attempt += 1;
            if attempt >= ZERO_TAG_REHASH_HARD_LIMIT {
                panic!(
                    "zero-tag rehash loop exceeded {ZERO_TAG_REHASH_HARD_LIMIT} attempts; \
                     the configured hash function is producing an all-zero fingerprint \
                     with implausible regularity"
                );
            }
            if attempt == ZERO_TAG_REHASH_ASSERTION_LIMIT {
                tracing::warn!(
                    attempt,
                    "zero-tag rehash loop has not terminated after {ZERO_TAG_REHASH_ASSERTION_LIMIT} \
                     attempts; this usually indicates a broken hash function"
                );
            }
            tag = if hash_len <= 64 {
                hasher.hash64(attempt, bytes) & self.tag_mask
            } else {
                hasher.hash128(attempt, bytes).0 & self.tag_mask
            };
        }

        (bucket_index, tag)
    }

    #[inline]
    fn bucket_index_from_high_bits(&self, h: u64) -> u64 {
        (h >> self.tag_bits) & self.bucket_mask
    }

    /// `altIndex(bucketIndex, tag) -> bucketIndex'`. An involution per tag:
    /// `alt_index(alt_index(b, t), t) == b`, which holds only because
    /// `num_buckets` is a power of two.
    pub(crate) fn alt_index(&self, bucket_index: u64, tag: u64) -> u64 {
        let r = (bucket_index ^ tag.wrapping_mul(MURMUR3_FINALIZER_K)) as i64;
        let r = if r < 0 { !r } else { r };
        (r as u64) & self.bucket_mask
    }

    pub(crate) fn tag_bits(&self) -> u32 {
        self.tag_bits
    }

    pub(crate) fn num_buckets(&self) -> u64 {
        self.num_buckets
    }
}
