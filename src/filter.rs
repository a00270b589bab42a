//! Orchestration: `put`/`might_contain`/`delete`/`approximate_count` and the
//! eviction cascade.

use std::cell::UnsafeCell;
use std::hash::{Hash, Hasher as StdHasher};
use std::marker::PhantomData;

use crate::bit_table::BitTable;
use crate::hash::{Funnel, ItemHasher};
use crate::index_tag::IndexTagCalc;
use crate::locker::SegmentedBucketLocker;
use crate::sync::{AtomicU64, Arc, Ordering};
use crate::victim::{VictimCell, VictimData};

/// Slots per bucket. Fixed by the data model, not a tuning knob.
pub const BUCKET_SIZE: usize = 4;

/// Upper bound on the eviction cascade. Exhausting this does not fail the
/// insert; the victim cache absorbs the orphan instead.
const INSERT_ATTEMPTS: usize = 500;

/// A thread-safe, serializable cuckoo filter.
///
/// See the crate-level documentation for a usage example. Construct one
/// with [`crate::CuckooFilterBuilder`].
pub struct CuckooFilter<T: ?Sized> {
    /// Guarded entirely through `locker`'s segment locks; never accessed
    /// without holding the segment (or all segments) covering the buckets
    /// being touched.
    pub(crate) table: UnsafeCell<BitTable>,
    pub(crate) locker: SegmentedBucketLocker,
    pub(crate) victim: VictimCell,
    pub(crate) index_tag: IndexTagCalc,
    /// Monotone-under-put, monotone-under-delete counter. Updated without
    /// holding any lock, after the structural change whose lock has
    /// already been released; see [`Self::get_count`] for the consequence
    /// of that under contention.
    pub(crate) count: AtomicU64,
    pub(crate) hasher: Arc<dyn ItemHasher>,
    pub(crate) funnel: Arc<dyn Funnel<T> + Send + Sync>,
    pub(crate) expected_concurrency: usize,
    pub(crate) max_keys: u64,
    pub(crate) fpp: f64,
    pub(crate) _marker: PhantomData<fn(&T)>,
}

// SAFETY: every access to `table` is mediated by `locker`'s segment locks
// (or, for the whole-table snapshot operations, by holding every segment's
// read lock). No two threads ever observe or mutate the same bit range of
// `table` without the matching lock discipline, so sharing references
// across threads is sound even though `UnsafeCell` itself is not `Sync`.
unsafe impl<T: ?Sized> Sync for CuckooFilter<T> {}
unsafe impl<T: ?Sized> Send for CuckooFilter<T> {}

impl<T: ?Sized> CuckooFilter<T> {
    pub(crate) fn from_parts(
        num_buckets: u64,
        tag_bits: u32,
        expected_concurrency: usize,
        hasher: Arc<dyn ItemHasher>,
        funnel: Arc<dyn Funnel<T> + Send + Sync>,
        max_keys: u64,
        fpp: f64,
    ) -> Self {
        tracing::debug!(
            num_buckets,
            tag_bits,
            segment_count = 2 * expected_concurrency,
            "constructing CuckooFilter"
        );
        Self {
            table: UnsafeCell::new(BitTable::new(num_buckets, tag_bits)),
            locker: SegmentedBucketLocker::new(expected_concurrency),
            victim: VictimCell::new(),
            index_tag: IndexTagCalc::new(num_buckets, tag_bits),
            count: AtomicU64::new(0),
            hasher,
            funnel,
            expected_concurrency,
            max_keys,
            fpp,
            _marker: PhantomData,
        }
    }

    fn funnel_bytes(&self, item: &T) -> Vec<u8> {
        let mut bytes = Vec::new();
        self.funnel.funnel(item, &mut bytes);
        bytes
    }

    fn positions(&self, item: &T) -> (u64, u64, u64) {
        let bytes = self.funnel_bytes(item);
        let (i1, tag) = self.index_tag.generate(self.hasher.as_ref(), &bytes);
        let i2 = self.index_tag.alt_index(i1, tag);
        (i1, i2, tag)
    }

    /// Inserts `item`. Returns `true` iff the item is now considered
    /// stored. Returns `false` only when the eviction cascade needed a
    /// second victim and one already existed, a normal, expected
    /// saturation signal, not an error.
    pub fn put(&self, item: &T) -> bool {
        let (i1, i2, tag) = self.positions(item);

        {
            let _guard = self.locker.lock_buckets_write(i1, i2);
            // SAFETY: `_guard` holds write locks on both i1's and i2's segments.
            let table = unsafe { &mut *self.table.get() };
            if table.insert_to_bucket(i1, tag) || table.insert_to_bucket(i2, tag) {
                drop(_guard);
                self.count.fetch_add(1, Ordering::Relaxed);
                return true;
            }
        }

        let Some(mut victim_guard) = self.victim.write_if_clear() else {
            return false;
        };

        victim_guard.occupied = true;
        victim_guard.data = VictimData { i1, i2, tag };

        for _ in 0..INSERT_ATTEMPTS {
            let cur = victim_guard.data.i2;
            let kicked_tag = victim_guard.data.tag;

            let old_tag = {
                let _seg = self.locker.lock_single_bucket_write(cur);
                // SAFETY: `_seg` holds the write lock on `cur`'s segment.
                let table = unsafe { &mut *self.table.get() };
                table.swap_random_tag_in_bucket(cur, kicked_tag)
            };

            let alt = self.index_tag.alt_index(cur, old_tag);

            let placed = {
                let _seg = self.locker.lock_single_bucket_write(alt);
                // SAFETY: `_seg` holds the write lock on `alt`'s segment.
                let table = unsafe { &mut *self.table.get() };
                table.insert_to_bucket(alt, old_tag)
            };

            if placed {
                victim_guard.occupied = false;
                drop(victim_guard);
                self.count.fetch_add(1, Ordering::Relaxed);
                return true;
            }

            victim_guard.data = VictimData { i1: cur, i2: alt, tag: old_tag };
        }

        tracing::warn!(
            attempts = INSERT_ATTEMPTS,
            "eviction loop exhausted INSERT_ATTEMPTS; the victim cache now \
             holds the orphaned tag to preserve the no-false-negative invariant"
        );
        drop(victim_guard);
        self.count.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// `true` means "possibly present"; `false` means "definitely absent".
    pub fn might_contain(&self, item: &T) -> bool {
        let (i1, i2, tag) = self.positions(item);

        {
            let _guard = self.locker.lock_buckets_read(i1, i2);
            // SAFETY: `_guard` holds read locks on both i1's and i2's segments.
            let table = unsafe { &*self.table.get() };
            if table.find_tag(i1, i2, tag) {
                return true;
            }
        }

        let victim = self.victim.read();
        victim.occupied && victim.data.tag == tag && (victim.data.i1 == i1 || victim.data.i2 == i1)
    }

    /// Deletes one copy of `item`. Returns `true` iff a matching
    /// fingerprint was removed. Deleting an item that was never inserted
    /// may legitimately succeed (with probability close to the configured
    /// false-positive probability) by removing an identical fingerprint
    /// that belongs to a different item.
    pub fn delete(&self, item: &T) -> bool {
        let (i1, i2, tag) = self.positions(item);

        let deleted_from_table = {
            let _guard = self.locker.lock_buckets_write(i1, i2);
            // SAFETY: `_guard` holds write locks on both i1's and i2's segments.
            let table = unsafe { &mut *self.table.get() };
            table.delete_from_bucket(i1, tag) || table.delete_from_bucket(i2, tag)
        };

        if deleted_from_table {
            self.count.fetch_sub(1, Ordering::Relaxed);
            self.try_reinsert_victim();
            return true;
        }

        if let Some(mut victim_guard) = self.victim.write_if_set() {
            let matches = victim_guard.data.tag == tag
                && (victim_guard.data.i1 == i1 || victim_guard.data.i2 == i1);
            if matches {
                victim_guard.occupied = false;
                drop(victim_guard);
                self.count.fetch_sub(1, Ordering::Relaxed);
                return true;
            }
        }

        false
    }

    /// Best-effort reinsertion of the victim, attempted after every
    /// successful delete. Lock order: victim first, then its segments.
    fn try_reinsert_victim(&self) {
        let Some(mut victim_guard) = self.victim.write_if_set() else {
            return;
        };
        let VictimData { i1, i2, tag } = victim_guard.data;
        let _guard = self.locker.lock_buckets_write(i1, i2);
        // SAFETY: `_guard` holds write locks on both i1's and i2's segments.
        let table = unsafe { &mut *self.table.get() };
        if table.insert_to_bucket(i1, tag) || table.insert_to_bucket(i2, tag) {
            victim_guard.occupied = false;
        }
    }

    /// Upper-bounded by 9 (8 table slots across the two candidate buckets,
    /// plus at most one victim copy) and always `>=` the true count for
    /// `item`.
    pub fn approximate_count(&self, item: &T) -> usize {
        let (i1, i2, tag) = self.positions(item);

        let mut count = {
            let _guard = self.locker.lock_buckets_read(i1, i2);
            // SAFETY: `_guard` holds read locks on both i1's and i2's segments.
            let table = unsafe { &*self.table.get() };
            table.count_tag(i1, i2, tag)
        };

        let victim = self.victim.read();
        if victim.occupied && victim.data.tag == tag && (victim.data.i1 == i1 || victim.data.i2 == i1)
        {
            count += 1;
        }
        count
    }

    /// Number of items currently in the filter. Best-effort under
    /// contention: a concurrent delete's victim reinsertion is not
    /// linearizable with a racing reader of `count`. Never relied on for
    /// correctness inside this crate.
    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn get_load_factor(&self) -> f64 {
        self.get_count() as f64 / self.get_actual_capacity() as f64
    }

    pub fn get_actual_capacity(&self) -> u64 {
        self.index_tag.num_buckets() * BUCKET_SIZE as u64
    }

    pub fn get_storage_size(&self) -> u64 {
        self.index_tag.num_buckets() * BUCKET_SIZE as u64 * self.index_tag.tag_bits() as u64
    }

    pub fn max_keys(&self) -> u64 {
        self.max_keys
    }

    pub fn false_positive_probability(&self) -> f64 {
        self.fpp
    }

    /// Deep, independent copy. O(table size); acquires every segment's
    /// read lock plus the victim's, the same snapshot discipline as
    /// [`Self::eq`] and [`Self::hash_to`].
    pub fn copy(&self) -> CuckooFilter<T>
    where
        T: Sized,
    {
        tracing::debug!("copy() acquiring all segment and victim locks for a consistent snapshot");
        let _all = self.locker.lock_all_buckets_read();
        let victim_snapshot = self.victim.snapshot();
        // SAFETY: holding every segment's read lock excludes all writers.
        let table_clone = unsafe { (*self.table.get()).clone() };

        CuckooFilter {
            table: UnsafeCell::new(table_clone),
            locker: SegmentedBucketLocker::new(self.expected_concurrency),
            victim: VictimCell::from_state(victim_snapshot.occupied, victim_snapshot.data),
            index_tag: IndexTagCalc::new(self.index_tag.num_buckets(), self.index_tag.tag_bits()),
            count: AtomicU64::new(self.count.load(Ordering::Relaxed)),
            hasher: Arc::clone(&self.hasher),
            funnel: Arc::clone(&self.funnel),
            expected_concurrency: self.expected_concurrency,
            max_keys: self.max_keys,
            fpp: self.fpp,
            _marker: PhantomData,
        }
    }

    /// Structural-equality hash counterpart of [`PartialEq`]. Named
    /// `hash_to` rather than `hash` so it does not collide with
    /// `std::hash::Hash::hash` while still being called from that impl.
    fn hash_to<H: StdHasher>(&self, state: &mut H) {
        tracing::debug!("hash() acquiring all segment locks for a consistent snapshot");
        let _all = self.locker.lock_all_buckets_read();
        // SAFETY: holding every segment's read lock excludes all writers.
        let table = unsafe { &*self.table.get() };
        table.raw_words().hash(state);
        let victim = self.victim.snapshot();
        victim.occupied.hash(state);
        if victim.occupied {
            victim.data.hash(state);
        }
        self.count.load(Ordering::Relaxed).hash(state);
    }
}

impl<T: ?Sized> PartialEq for CuckooFilter<T> {
    /// O(table size); blocks all writers on both filters for the duration.
    fn eq(&self, other: &Self) -> bool {
        if self.index_tag.num_buckets() != other.index_tag.num_buckets()
            || self.index_tag.tag_bits() != other.index_tag.tag_bits()
            || self.expected_concurrency != other.expected_concurrency
        {
            return false;
        }
        tracing::debug!("equals() acquiring all segment locks on both filters for comparison");
        let _self_guard = self.locker.lock_all_buckets_read();
        let _other_guard = other.locker.lock_all_buckets_read();
        // SAFETY: both `_self_guard`/`_other_guard` hold every segment's
        // read lock on their respective filters.
        let self_table = unsafe { &*self.table.get() };
        let other_table = unsafe { &*other.table.get() };
        if self_table.raw_words() != other_table.raw_words() {
            return false;
        }
        let self_victim = self.victim.snapshot();
        let other_victim = other.victim.snapshot();
        self_victim.occupied == other_victim.occupied
            && (!self_victim.occupied || self_victim.data == other_victim.data)
            && self.count.load(Ordering::Relaxed) == other.count.load(Ordering::Relaxed)
    }
}

impl<T: ?Sized> Eq for CuckooFilter<T> {}

impl<T: ?Sized> Hash for CuckooFilter<T> {
    fn hash<H: StdHasher>(&self, state: &mut H) {
        self.hash_to(state);
    }
}
