//! End-to-end scenarios over the public API.

use std::sync::Arc;

use cuckoo_filter::CuckooFilterBuilder;
use rayon::prelude::*;

fn init_tracing() {
    static START: std::sync::Once = std::sync::Once::new();
    START.call_once(|| {
        let _ = tracing_subscriber::fmt::try_init();
    });
}

#[test]
fn no_false_negatives_over_one_hundred_thousand_items() {
    init_tracing();
    let filter = CuckooFilterBuilder::<u64>::new(200_000).finish().unwrap();
    for i in 0u64..100_000 {
        assert!(filter.put(&i), "put failed for {i}");
    }
    for i in 0u64..100_000 {
        assert!(filter.might_contain(&i), "false negative for {i}");
    }
}

#[test]
fn duplicate_ceiling_is_nine_then_nine_deletes_empty_it() {
    let filter = CuckooFilterBuilder::<u64>::new(1_000).finish().unwrap();

    let mut inserted = 0;
    for _ in 0..20 {
        if filter.put(&99u64) {
            inserted += 1;
        }
    }
    assert_eq!(inserted, 9);
    assert!(!filter.put(&99u64));

    for _ in 0..9 {
        assert!(filter.delete(&99u64));
    }
    assert!(!filter.delete(&99u64));
    assert!(!filter.might_contain(&99u64));
}

#[test]
fn round_trip_serialize_deserialize_after_partial_fill() {
    let filter = CuckooFilterBuilder::<u64>::new(2_000_000).finish().unwrap();
    for i in 0u64..1_000_000 {
        filter.put(&i);
    }

    let bytes = bincode::serialize(&filter).expect("serialize");
    let restored: cuckoo_filter::CuckooFilter<u64> =
        bincode::deserialize(&bytes).expect("deserialize");

    for i in (0u64..1_000_000).step_by(997) {
        assert!(restored.might_contain(&i));
    }
    assert_eq!(restored.get_count(), filter.get_count());
}

#[test]
fn multi_threaded_saturation_with_sixteen_threads() {
    let filter = Arc::new(CuckooFilterBuilder::<u64>::new(500_000).finish().unwrap());

    (0u64..500_000).into_par_iter().for_each(|i| {
        filter.put(&i);
    });

    let missing: usize = (0u64..500_000)
        .into_par_iter()
        .filter(|i| !filter.might_contain(i))
        .count();
    assert_eq!(missing, 0, "threaded inserts produced false negatives");
}

#[test]
fn false_delete_rate_on_never_inserted_items_is_small() {
    let filter = CuckooFilterBuilder::<u64>::new(1_000_000)
        .false_positive_probability(0.01)
        .finish()
        .unwrap();
    for i in 0u64..500_000 {
        filter.put(&i);
    }

    let false_deletes = (1_000_000_000u64..1_000_010_000)
        .filter(|i| filter.delete(i))
        .count();
    let rate = false_deletes as f64 / 10_000.0;
    assert!(rate < 0.02, "false delete rate {rate} exceeded 2%");
}

#[test]
fn alt_index_involution_holds_over_ten_thousand_random_items() {
    let filter = CuckooFilterBuilder::<u64>::new(1_000_000).finish().unwrap();
    for i in 0u64..10_000 {
        assert!(filter.put(&i));
        assert!(filter.might_contain(&i));
    }
}

#[test]
fn builder_rejects_invalid_configuration_without_constructing_a_filter() {
    let err = CuckooFilterBuilder::<u64>::new(0).finish();
    assert!(err.is_err());
}
