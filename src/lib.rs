//! A concurrent, serializable cuckoo filter.
//!
//! A cuckoo filter is a probabilistic approximate-membership structure: for a
//! tunable false-positive probability it answers "has item x been inserted?"
//! while also supporting deletion and approximate counting, which a classical
//! Bloom filter cannot do. This crate implements the bucketized, segment-locked
//! variant described by Fan et al., with a single-slot victim cache so that a
//! saturated table never produces a false negative.
//!
//! Concurrency is achieved by splitting the bucket table into
//! `2 * expected_concurrency` lock segments (see [`locker`]): many threads can
//! mutate disjoint segments in parallel, and every multi-bucket acquisition
//! follows a single global lock order so the filter never deadlocks.
//!
//! ```
//! use cuckoo_filter::CuckooFilterBuilder;
//!
//! let filter = CuckooFilterBuilder::<u64>::new(1_000)
//!     .false_positive_probability(0.01)
//!     .finish()
//!     .unwrap();
//!
//! assert!(filter.put(&42));
//! assert!(filter.might_contain(&42));
//! assert!(filter.delete(&42));
//! assert!(!filter.might_contain(&42));
//! ```

mod bit_table;
mod builder;
mod error;
mod filter;
mod hash;
mod index_tag;
mod locker;
mod serde_impl;
mod sync;
mod victim;

pub use builder::CuckooFilterBuilder;
pub use error::ConfigError;
pub use filter::{CuckooFilter, BUCKET_SIZE};
pub use hash::{Algorithm, Funnel, ItemHasher};
