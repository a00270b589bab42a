//! Concurrency model checking. Only compiled under `--cfg loom`; loom
//! explores every thread interleaving so the table here must stay tiny.

#![cfg(loom)]

use std::sync::Arc;

use cuckoo_filter::CuckooFilterBuilder;

#[test]
fn concurrent_puts_to_disjoint_items_never_lose_an_insert() {
    loom::model(|| {
        let filter = Arc::new(
            CuckooFilterBuilder::<u64>::new(16)
                .expected_concurrency(2)
                .finish()
                .unwrap(),
        );

        let f1 = Arc::clone(&filter);
        let t1 = loom::thread::spawn(move || {
            f1.put(&1u64);
        });
        let f2 = Arc::clone(&filter);
        let t2 = loom::thread::spawn(move || {
            f2.put(&2u64);
        });

        t1.join().unwrap();
        t2.join().unwrap();

        assert!(filter.might_contain(&1u64));
        assert!(filter.might_contain(&2u64));
    });
}

#[test]
fn concurrent_put_and_delete_of_the_same_item_never_panics() {
    loom::model(|| {
        let filter = Arc::new(
            CuckooFilterBuilder::<u64>::new(8)
                .expected_concurrency(1)
                .finish()
                .unwrap(),
        );
        filter.put(&7u64);

        let f1 = Arc::clone(&filter);
        let t1 = loom::thread::spawn(move || {
            f1.delete(&7u64);
        });
        let f2 = Arc::clone(&filter);
        let t2 = loom::thread::spawn(move || {
            f2.might_contain(&7u64);
        });

        t1.join().unwrap();
        t2.join().unwrap();
    });
}
