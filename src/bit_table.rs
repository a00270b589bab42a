//! Bit-packed bucket array.
//!
//! The table is a flat bit array of `numBuckets * BUCKET_SIZE * tagBits`
//! bits. None of the operations here are internally synchronized; the
//! caller is expected to hold the appropriate segment lock from
//! [`crate::locker::SegmentedBucketLocker`] before calling any of them.

use rand::Rng;

use crate::filter::BUCKET_SIZE;

/// Bit-packed storage for `numBuckets` buckets of `BUCKET_SIZE` slots each.
pub(crate) struct BitTable {
    /// One extra trailing word so a tag that straddles the last two words
    /// of the array never reads or writes out of bounds.
    words: Vec<u64>,
    tag_bits: u32,
    tag_mask: u64,
    num_buckets: u64,
}

impl BitTable {
    pub(crate) fn new(num_buckets: u64, tag_bits: u32) -> Self {
        let total_bits = num_buckets * BUCKET_SIZE as u64 * tag_bits as u64;
        let num_words = ((total_bits + 63) / 64) as usize + 1;
        Self {
            words: vec![0u64; num_words],
            tag_bits,
            tag_mask: if tag_bits == 64 { u64::MAX } else { (1u64 << tag_bits) - 1 },
            num_buckets,
        }
    }

    /// Total size of the bit array, in bits.
    /// Excludes the single padding word kept for spanning reads/writes.
    pub(crate) fn storage_size_bits(&self) -> u64 {
        self.num_buckets * BUCKET_SIZE as u64 * self.tag_bits as u64
    }

    #[inline]
    fn bit_offset(&self, bucket: u64, slot: usize) -> u64 {
        debug_assert!(bucket < self.num_buckets);
        debug_assert!(slot < BUCKET_SIZE);
        (bucket * BUCKET_SIZE as u64 + slot as u64) * self.tag_bits as u64
    }

    pub(crate) fn read_tag(&self, bucket: u64, slot: usize) -> u64 {
        let bit_offset = self.bit_offset(bucket, slot);
        let word_idx = (bit_offset / 64) as usize;
        let bit_in_word = (bit_offset % 64) as u32;
        let first_bits = 64 - bit_in_word;

        let low = self.words[word_idx] >> bit_in_word;
        if self.tag_bits <= first_bits {
            low & self.tag_mask
        } else {
            let remaining = self.tag_bits - first_bits;
            let high_mask = if remaining == 64 { u64::MAX } else { (1u64 << remaining) - 1 };
            let high = self.words[word_idx + 1] & high_mask;
            (low | (high << first_bits)) & self.tag_mask
        }
    }

    pub(crate) fn write_tag(&mut self, bucket: u64, slot: usize, tag: u64) {
        let tag = tag & self.tag_mask;
        let bit_offset = self.bit_offset(bucket, slot);
        let word_idx = (bit_offset / 64) as usize;
        let bit_in_word = (bit_offset % 64) as u32;
        let first_bits = 64 - bit_in_word;

        let mask_low = self.tag_mask << bit_in_word;
        self.words[word_idx] = (self.words[word_idx] & !mask_low) | (tag << bit_in_word);

        if self.tag_bits > first_bits {
            let remaining = self.tag_bits - first_bits;
            let high_mask = if remaining == 64 { u64::MAX } else { (1u64 << remaining) - 1 };
            self.words[word_idx + 1] =
                (self.words[word_idx + 1] & !high_mask) | (tag >> first_bits);
        }
    }

    pub(crate) fn check_tag(&self, bucket: u64, slot: usize, tag: u64) -> bool {
        self.read_tag(bucket, slot) == (tag & self.tag_mask)
    }

    /// Scans `slot = 0..BUCKET_SIZE`; writes `tag` into the first empty
    /// slot found and returns `true`, else returns `false` untouched.
    pub(crate) fn insert_to_bucket(&mut self, bucket: u64, tag: u64) -> bool {
        for slot in 0..BUCKET_SIZE {
            if self.read_tag(bucket, slot) == 0 {
                self.write_tag(bucket, slot, tag);
                return true;
            }
        }
        false
    }

    /// Precondition: all `BUCKET_SIZE` slots of `bucket` are occupied.
    /// Picks a uniformly random slot, swaps `tag` into it, and returns the
    /// tag that was evicted.
    pub(crate) fn swap_random_tag_in_bucket(&mut self, bucket: u64, tag: u64) -> u64 {
        let slot = rand::thread_rng().gen_range(0..BUCKET_SIZE);
        let old = self.read_tag(bucket, slot);
        self.write_tag(bucket, slot, tag);
        old
    }

    /// `true` iff any of the 8 slots across `b1, b2` holds `tag`.
    pub(crate) fn find_tag(&self, b1: u64, b2: u64, tag: u64) -> bool {
        let tag = tag & self.tag_mask;
        (0..BUCKET_SIZE).any(|slot| self.read_tag(b1, slot) == tag)
            || (0..BUCKET_SIZE).any(|slot| self.read_tag(b2, slot) == tag)
    }

    /// Clears the first slot in `bucket` equal to `tag`. At most one slot
    /// is cleared per call.
    pub(crate) fn delete_from_bucket(&mut self, bucket: u64, tag: u64) -> bool {
        let tag = tag & self.tag_mask;
        for slot in 0..BUCKET_SIZE {
            if self.read_tag(bucket, slot) == tag {
                self.write_tag(bucket, slot, 0);
                return true;
            }
        }
        false
    }

    /// Count of slots across `b1, b2` equal to `tag`, in `[0, 8]`. If `b1`
    /// and `b2` are the same physical bucket, it is counted once, not
    /// twice.
    pub(crate) fn count_tag(&self, b1: u64, b2: u64, tag: u64) -> usize {
        let tag = tag & self.tag_mask;
        let first = (0..BUCKET_SIZE).filter(|&slot| self.read_tag(b1, slot) == tag).count();
        if b1 == b2 {
            return first;
        }
        first + (0..BUCKET_SIZE).filter(|&slot| self.read_tag(b2, slot) == tag).count()
    }

    /// Total non-zero slots in the table (used to cross-check `count`).
    pub(crate) fn count_occupied_slots(&self) -> u64 {
        (0..self.num_buckets)
            .flat_map(|b| (0..BUCKET_SIZE).map(move |s| (b, s)))
            .filter(|&(b, s)| self.read_tag(b, s) != 0)
            .count() as u64
    }

    pub(crate) fn tag_bits(&self) -> u32 {
        self.tag_bits
    }

    pub(crate) fn num_buckets(&self) -> u64 {
        self.num_buckets
    }

    pub(crate) fn raw_words(&self) -> &[u64] {
        &self.words
    }

    pub(crate) fn from_raw_words(words: Vec<u64>, num_buckets: u64, tag_bits: u32) -> Self {
        Self {
            words,
            tag_bits,
            tag_mask: if tag_bits == 64 { u64::MAX } else { (1u64 << tag_bits) - 1 },
            num_buckets,
        }
    }
}

impl Clone for BitTable {
    fn clone(&self) -> Self {
        Self {
            words: self.words.clone(),
            tag_bits: self.tag_bits,
            tag_mask: self.tag_mask,
            num_buckets: self.num_buckets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips_across_word_boundaries() {
        // tag_bits=13 guarantees some slots straddle a 64-bit word boundary.
        let mut table = BitTable::new(64, 13);
        for bucket in 0..64u64 {
            for slot in 0..BUCKET_SIZE {
                let tag = ((bucket * 4 + slot as u64) % ((1 << 13) - 1)) + 1;
                table.write_tag(bucket, slot, tag);
            }
        }
        for bucket in 0..64u64 {
            for slot in 0..BUCKET_SIZE {
                let expected = ((bucket * 4 + slot as u64) % ((1 << 13) - 1)) + 1;
                assert_eq!(table.read_tag(bucket, slot), expected);
            }
        }
    }

    #[test]
    fn insert_to_bucket_fills_first_empty_slot_then_refuses() {
        let mut table = BitTable::new(4, 8);
        for i in 1..=4u64 {
            assert!(table.insert_to_bucket(0, i));
        }
        assert!(!table.insert_to_bucket(0, 5));
    }

    #[test]
    fn find_tag_checks_both_buckets() {
        let mut table = BitTable::new(4, 8);
        table.write_tag(2, 1, 99);
        assert!(table.find_tag(0, 2, 99));
        assert!(!table.find_tag(0, 1, 99));
    }

    #[test]
    fn delete_from_bucket_clears_exactly_one_slot() {
        let mut table = BitTable::new(4, 8);
        table.write_tag(0, 0, 7);
        table.write_tag(0, 1, 7);
        table.write_tag(1, 0, 7);
        assert!(table.delete_from_bucket(0, 7));
        assert_eq!(table.count_tag(0, 1, 7), 2);
        assert!(table.delete_from_bucket(0, 7));
        assert_eq!(table.count_tag(0, 1, 7), 1);
        assert!(!table.delete_from_bucket(0, 7));
    }

    #[test]
    fn count_tag_spans_both_buckets_up_to_eight() {
        let mut table = BitTable::new(4, 8);
        for slot in 0..BUCKET_SIZE {
            table.write_tag(0, slot, 3);
            table.write_tag(1, slot, 3);
        }
        assert_eq!(table.count_tag(0, 1, 3), 8);
    }

    #[test]
    fn count_tag_counts_a_shared_bucket_once() {
        let mut table = BitTable::new(4, 8);
        table.write_tag(0, 0, 3);
        table.write_tag(0, 1, 3);
        assert_eq!(table.count_tag(0, 0, 3), 2);
    }

    #[test]
    fn storage_size_matches_geometry() {
        let table = BitTable::new(128, 10);
        assert_eq!(table.storage_size_bits(), 128 * 4 * 10);
    }
}
