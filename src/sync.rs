//! Indirection so the same source can be checked both under real threads and
//! under `loom`'s model checker (`cfg(loom)` swaps every primitive below for
//! its `loom` twin). Only pulled in by `tests/loom.rs`.

#[cfg(loom)]
pub(crate) use loom::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

#[cfg(not(loom))]
pub(crate) use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
