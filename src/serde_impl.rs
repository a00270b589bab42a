//! Serialization.
//!
//! Locks carry no data of their own and aren't serializable, so the wire
//! form captures the persistent state instead: `tagBits`, `numBuckets`,
//! `expectedConcurrency`, the hash-algorithm identifier plus its two salt
//! longs, the item funnel identity, the full bit array, `count`, the
//! victim's `occupied` flag and `(i1, i2, tag)`. `SegmentedBucketLocker` is
//! rebuilt from `expectedConcurrency` rather than serialized; a
//! deserialized filter must rebuild its locks and be fully functional.

use std::cell::UnsafeCell;
use std::hash::Hash;
use std::marker::PhantomData;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::bit_table::BitTable;
use crate::filter::CuckooFilter;
use crate::hash::{hasher_from_salts, Algorithm, HashFunnel};
use crate::index_tag::IndexTagCalc;
use crate::locker::SegmentedBucketLocker;
use crate::sync::{AtomicU64, Arc, Ordering};
use crate::victim::{VictimCell, VictimData};

#[derive(Serialize, Deserialize)]
struct SerializedFilter {
    algorithm: Algorithm,
    salt0: u64,
    salt1: u64,
    funnel_identity: String,
    tag_bits: u32,
    num_buckets: u64,
    expected_concurrency: usize,
    max_keys: u64,
    false_positive_probability: f64,
    words: Vec<u64>,
    victim_occupied: bool,
    victim_data: VictimData,
    count: u64,
}

impl<T: Hash + 'static> Serialize for CuckooFilter<T> {
    /// O(table size): acquires every segment's read lock plus the victim's
    /// for a consistent snapshot, the same discipline as [`PartialEq`] and
    /// [`Self::copy`](crate::CuckooFilter::copy).
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        tracing::debug!("serializing CuckooFilter: acquiring all segment and victim locks");
        let _all = self.locker.lock_all_buckets_read();
        // SAFETY: `_all` holds every segment's read lock.
        let table = unsafe { &*self.table.get() };
        let victim = self.victim.snapshot();
        let (salt0, salt1) = self.hasher.salts();

        let shadow = SerializedFilter {
            algorithm: self.hasher.algorithm(),
            salt0,
            salt1,
            funnel_identity: self.funnel.identity().to_owned(),
            tag_bits: self.index_tag.tag_bits(),
            num_buckets: self.index_tag.num_buckets(),
            expected_concurrency: self.expected_concurrency,
            max_keys: self.max_keys,
            false_positive_probability: self.fpp,
            words: table.raw_words().to_vec(),
            victim_occupied: victim.occupied,
            victim_data: victim.data,
            count: self.count.load(Ordering::Relaxed),
        };
        shadow.serialize(serializer)
    }
}

impl<'de, T: Hash + 'static> Deserialize<'de> for CuckooFilter<T> {
    /// Only round-trips filters built with the default `HashFunnel`. A
    /// custom funnel's byte-encoding logic cannot be reconstructed from its
    /// persisted identity string alone, so deserializing one fails loudly
    /// rather than silently falling back to a different encoding (see
    /// DESIGN.md's open-question resolution).
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let shadow = SerializedFilter::deserialize(deserializer)?;
        if shadow.funnel_identity != "hash" {
            return Err(D::Error::custom(format!(
                "cannot deserialize a CuckooFilter built with a custom funnel ({:?}); \
                 only the default Hash-derived funnel round-trips",
                shadow.funnel_identity
            )));
        }

        let table = BitTable::from_raw_words(shadow.words, shadow.num_buckets, shadow.tag_bits);

        Ok(CuckooFilter {
            table: UnsafeCell::new(table),
            locker: SegmentedBucketLocker::new(shadow.expected_concurrency),
            victim: VictimCell::from_state(shadow.victim_occupied, shadow.victim_data),
            index_tag: IndexTagCalc::new(shadow.num_buckets, shadow.tag_bits),
            count: AtomicU64::new(shadow.count),
            hasher: hasher_from_salts(shadow.algorithm, (shadow.salt0, shadow.salt1)),
            funnel: Arc::new(HashFunnel),
            expected_concurrency: shadow.expected_concurrency,
            max_keys: shadow.max_keys,
            fpp: shadow.false_positive_probability,
            _marker: PhantomData,
        })
    }
}
