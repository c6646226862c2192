use crate::{key::Key, sync::UnsafeCell};
use core::hash::{Hash, Hasher};
use derive_more::{Deref, DerefMut};
use rustc_hash::FxBuildHasher;
use std::collections::HashSet;

/// A minimal `UnsafeCell` wrapper that is `Sync` when its contents can be
/// shared and sent across threads.
///
/// Used by the memo table for bucket entries and submap slots, where
/// exclusivity of writes is ensured by the publication protocol (a writer
/// claims a bucket or holds the expansion latch before touching the cell,
/// and readers access it only after observing the published state).
#[derive(Deref, DerefMut)]
#[repr(transparent)]
pub(crate) struct SyncUnsafeCell<T>(UnsafeCell<T>);

// SAFETY: All mutation is gated by an atomic claim (bucket CAS or the
// expansion latch) that makes the writer exclusive, and readers only touch
// the cell after synchronizing with the writer's release store. `T: Send`
// because values written by one thread are read and dropped by others.
unsafe impl<T: Send + Sync> Sync for SyncUnsafeCell<T> {}

impl<T> SyncUnsafeCell<T> {
    pub(crate) fn new(val: T) -> Self {
        Self(UnsafeCell::new(val))
    }
}

/// Key wrapper that hashes through [`Key::hash1`], for the worker-local
/// on-stack set maintained by cycle detection.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct TrackedKey<K>(pub(crate) K);

impl<K: Key> Hash for TrackedKey<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash1());
    }
}

/// Set of keys currently on a worker's evaluation stack.
pub(crate) type KeySet<K> = HashSet<TrackedKey<K>, FxBuildHasher>;
