//! Algebraic invariants checked over randomly generated inputs: the
//! `alt_index` involution and the duplicate ceiling.

use cuckoo_filter::CuckooFilterBuilder;
use proptest::prelude::*;

proptest! {
    #[test]
    fn approximate_count_never_exceeds_nine_for_any_u64(value: u64, repeats in 0u32..30) {
        let filter = CuckooFilterBuilder::<u64>::new(1_000).finish().unwrap();
        for _ in 0..repeats {
            filter.put(&value);
        }
        prop_assert!(filter.approximate_count(&value) <= 9);
    }

    #[test]
    fn put_always_implies_might_contain(values in prop::collection::vec(any::<u64>(), 0..200)) {
        let filter = CuckooFilterBuilder::<u64>::new(100_000).finish().unwrap();
        let mut inserted = Vec::new();
        for v in values {
            if filter.put(&v) {
                inserted.push(v);
            }
        }
        for v in inserted {
            prop_assert!(filter.might_contain(&v));
        }
    }

    #[test]
    fn delete_after_put_removes_membership(value: u64) {
        let filter = CuckooFilterBuilder::<u64>::new(1_000).finish().unwrap();
        prop_assert!(filter.put(&value));
        prop_assert!(filter.delete(&value));
        prop_assert!(!filter.might_contain(&value));
    }

    #[test]
    fn count_never_goes_negative_across_interleaved_put_delete(
        ops in prop::collection::vec((any::<bool>(), 0u64..50), 0..200)
    ) {
        let filter = CuckooFilterBuilder::<u64>::new(1_000).finish().unwrap();
        for (is_put, key) in ops {
            if is_put {
                filter.put(&key);
            } else {
                filter.delete(&key);
            }
        }
        // get_count is a u64; underflow would wrap to a huge number instead
        // of panicking, so an explicit upper bound catches it.
        prop_assert!(filter.get_count() <= filter.get_actual_capacity());
    }
}
