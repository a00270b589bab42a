//! The single-slot victim cache.
//!
//! At most one orphaned `(i1, i2, tag)` triple may exist at a time, so the
//! cell is a plain value struct guarded by an upgradable read/write lock.
//! `write_if_clear`/`write_if_set` avoid taking a write lock just to
//! inspect the rarely-changing `occupied` flag, using `parking_lot`'s
//! upgradable read guard.

use parking_lot::{RwLock, RwLockReadGuard, RwLockUpgradableReadGuard, RwLockWriteGuard};

/// The orphaned triple held outside the table. Only meaningful while
/// `occupied` is `true`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub(crate) struct VictimData {
    pub(crate) i1: u64,
    pub(crate) i2: u64,
    pub(crate) tag: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct VictimState {
    pub(crate) occupied: bool,
    pub(crate) data: VictimData,
}

pub(crate) struct VictimCell {
    inner: RwLock<VictimState>,
}

impl VictimCell {
    pub(crate) fn new() -> Self {
        Self { inner: RwLock::new(VictimState::default()) }
    }

    pub(crate) fn from_state(occupied: bool, data: VictimData) -> Self {
        Self { inner: RwLock::new(VictimState { occupied, data }) }
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, VictimState> {
        self.inner.read()
    }

    /// Acquires read access, and if the cell is currently empty, upgrades
    /// to a write lock and returns it; otherwise returns `None` without
    /// ever taking the write lock.
    pub(crate) fn write_if_clear(&self) -> Option<RwLockWriteGuard<'_, VictimState>> {
        let upgradable: RwLockUpgradableReadGuard<'_, VictimState> = self.inner.upgradable_read();
        if upgradable.occupied {
            None
        } else {
            Some(RwLockUpgradableReadGuard::upgrade(upgradable))
        }
    }

    /// Symmetric to [`Self::write_if_clear`]: upgrades only when the cell
    /// currently holds a victim.
    pub(crate) fn write_if_set(&self) -> Option<RwLockWriteGuard<'_, VictimState>> {
        let upgradable: RwLockUpgradableReadGuard<'_, VictimState> = self.inner.upgradable_read();
        if upgradable.occupied {
            Some(RwLockUpgradableReadGuard::upgrade(upgradable))
        } else {
            None
        }
    }

    pub(crate) fn snapshot(&self) -> VictimState {
        *self.inner.read()
    }
}

impl Clone for VictimCell {
    fn clone(&self) -> Self {
        let state = *self.inner.read();
        Self { inner: RwLock::new(state) }
    }
}
