use crate::{
    key::Key,
    sync::{fence, AtomicU8, AtomicUsize, Ordering},
    types::SyncUnsafeCell,
};

/// Bucket states. The only transitions are `EMPTY -> BUSY -> VALID`, each
/// taken at most once; a bucket is never reclaimed.
const EMPTY: u8 = 0;
const BUSY: u8 = 1;
const VALID: u8 = 2;

/// A committed `(key, value)` pair. Immutable once its bucket is `VALID`.
pub(super) struct Entry<K, V> {
    pub(super) key: K,
    pub(super) value: V,
}

struct Bucket<K, V> {
    state: AtomicU8,
    entry: SyncUnsafeCell<Option<Entry<K, V>>>,
}

impl<K, V> Bucket<K, V> {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            entry: SyncUnsafeCell::new(None),
        }
    }
}

/// Returned by [`Submap::insert`] when a probe tours every bucket without
/// claiming or matching one; the map reacts by expanding.
#[derive(Debug)]
pub(super) struct SubmapFull;

/// One fixed-capacity open-addressed table of the memo map.
///
/// Capacity is prime, so any probe increment in `[1, capacity - 1]` visits
/// every bucket before revisiting the start.
pub(super) struct Submap<K, V> {
    buckets: Box<[Bucket<K, V>]>,
    num_valid: AtomicUsize,
    max_load_factor: f64,
}

impl<K, V> Submap<K, V> {
    pub(super) fn new(capacity: usize, max_load_factor: f64) -> Self {
        Self {
            buckets: (0..capacity).map(|_| Bucket::new()).collect(),
            num_valid: AtomicUsize::new(0),
            max_load_factor,
        }
    }

    pub(super) fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Lower bound on the number of `VALID` buckets; the counter is bumped
    /// with relaxed ordering and may momentarily lag.
    pub(super) fn num_valid(&self) -> usize {
        self.num_valid.load(Ordering::Relaxed)
    }

    pub(super) fn is_overloaded(&self) -> bool {
        self.num_valid() as f64 / self.capacity() as f64 >= self.max_load_factor
    }

    /// Double-hashing probe stride, in `[1, capacity - 1]`.
    fn probe_increment(&self, hash2: u64) -> usize {
        1 + (hash2 % (self.capacity() as u64 - 1)) as usize
    }

    /// Returns a reference to the entry of the bucket at `index`.
    ///
    /// # Safety
    /// The caller must have observed the bucket `VALID` behind an acquire
    /// fence.
    pub(super) unsafe fn entry_unchecked(&self, index: usize) -> &Entry<K, V> {
        self.buckets[index].entry.with(|entry| {
            // SAFETY: `VALID` is release-stored after the entry is written
            // and never transitions away, so the entry is initialized and
            // no longer mutated.
            unsafe { (*entry).as_ref().unwrap() }
        })
    }
}

impl<K: Key, V> Submap<K, V> {
    /// Looks up `key`, returning its bucket index.
    ///
    /// Stops at the first `EMPTY` bucket; probes past `BUSY` ones, so an
    /// entry that is concurrently being committed may be missed. The
    /// caller either retries later or races the insert and loses.
    pub(super) fn find(&self, key: &K, hash1: u64, hash2: u64) -> Option<usize> {
        let capacity = self.capacity();
        let start = (hash1 % capacity as u64) as usize;
        let increment = self.probe_increment(hash2);
        let mut index = start;
        loop {
            let bucket = &self.buckets[index];
            match bucket.state.load(Ordering::Relaxed) {
                VALID => {
                    fence(Ordering::Acquire);
                    // SAFETY: observed `VALID` behind the fence above.
                    if unsafe { self.entry_unchecked(index) }.key == *key {
                        return Some(index);
                    }
                }
                EMPTY => return None,
                // BUSY: a writer owns the bucket; probe past it.
                _ => {}
            }
            index = (index + increment) % capacity;
            if index == start {
                return None;
            }
        }
    }

    /// Inserts an entry for `key` unless one is already present.
    ///
    /// The value is forced out of `compute` into `value` the first time a
    /// claimable bucket is seen, so it is produced at most once across the
    /// caller's whole insert attempt, including restarts after
    /// [`SubmapFull`].
    pub(super) fn insert<F>(
        &self,
        key: &K,
        hash1: u64,
        hash2: u64,
        compute: &mut Option<F>,
        value: &mut Option<V>,
    ) -> Result<(usize, bool), SubmapFull>
    where
        F: FnOnce(&K) -> V,
    {
        let capacity = self.capacity();
        let start = (hash1 % capacity as u64) as usize;
        let increment = self.probe_increment(hash2);
        let mut index = start;
        loop {
            let bucket = &self.buckets[index];
            let state = bucket.state.load(Ordering::Relaxed);
            if state == EMPTY {
                // Probably claimable: produce the value before the claim so
                // the bucket spends as little time as possible in `BUSY`.
                if value.is_none() {
                    let compute = compute.take().expect("Submap::insert: [1]");
                    *value = Some(compute(key));
                }
                if bucket
                    .state
                    .compare_exchange(EMPTY, BUSY, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    let value = value.take().expect("Submap::insert: [2]");
                    bucket.entry.with_mut(|entry| {
                        // SAFETY: the claim above made this thread the
                        // bucket's only writer, and readers do not touch
                        // the entry before observing `VALID`.
                        unsafe {
                            *entry = Some(Entry {
                                key: key.clone(),
                                value,
                            });
                        }
                    });
                    bucket.state.store(VALID, Ordering::Release);
                    self.num_valid.fetch_add(1, Ordering::Relaxed);
                    return Ok((index, true));
                }
            }
            // Re-reading the state catches buckets that turned `VALID`
            // since the first load, including a lost claim race; this trims
            // duplicate entries under contention.
            if state == VALID || bucket.state.load(Ordering::Relaxed) == VALID {
                fence(Ordering::Acquire);
                // SAFETY: observed `VALID` behind the fence above.
                if unsafe { self.entry_unchecked(index) }.key == *key {
                    return Ok((index, false));
                }
            }
            index = (index + increment) % capacity;
            if index == start {
                return Err(SubmapFull);
            }
        }
    }

    /// Index of the first `VALID` bucket at or after `index`, observed
    /// behind an acquire fence.
    pub(super) fn seek(&self, mut index: usize) -> Option<usize> {
        while index < self.capacity() {
            if self.buckets[index].state.load(Ordering::Relaxed) == VALID {
                fence(Ordering::Acquire);
                return Some(index);
            }
            index += 1;
        }
        None
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use crate::key::Key;
    use core::cell::Cell;

    fn insert(submap: &Submap<u64, u64>, key: u64, value: u64) -> Result<(usize, bool), SubmapFull> {
        let mut compute = Some(move |_: &u64| value);
        let mut forced = None;
        submap.insert(&key, key.hash1(), key.hash2(), &mut compute, &mut forced)
    }

    fn find(submap: &Submap<u64, u64>, key: u64) -> Option<u64> {
        submap
            .find(&key, key.hash1(), key.hash2())
            .map(|index| unsafe { submap.entry_unchecked(index) }.value)
    }

    #[test]
    fn insert_then_find() {
        let submap = Submap::new(11, 0.75);
        for key in 0..5 {
            let (_, inserted) = insert(&submap, key, key * 10).unwrap();
            assert!(inserted);
        }
        for key in 0..5 {
            assert_eq!(find(&submap, key), Some(key * 10));
        }
        assert_eq!(find(&submap, 99), None);
        assert_eq!(submap.num_valid(), 5);
    }

    #[test]
    fn duplicate_insert_is_reported() {
        let submap = Submap::new(11, 0.75);
        let (index, inserted) = insert(&submap, 7, 70).unwrap();
        assert!(inserted);
        let (existing, inserted) = insert(&submap, 7, 71).unwrap();
        assert!(!inserted);
        assert_eq!(existing, index);
        // The losing value never replaces the committed one.
        assert_eq!(find(&submap, 7), Some(70));
        assert_eq!(submap.num_valid(), 1);
    }

    #[test]
    fn compute_runs_once_per_attempt() {
        let submap = Submap::new(11, 0.75);
        let calls = Cell::new(0);
        let mut compute = Some(|_: &u64| {
            calls.set(calls.get() + 1);
            42_u64
        });
        let mut forced = None;
        let key = 3_u64;
        submap
            .insert(&key, key.hash1(), key.hash2(), &mut compute, &mut forced)
            .map_err(|_| ())
            .unwrap();
        assert_eq!(calls.get(), 1);

        // A hit never invokes the compute function at all.
        let mut compute = Some(|_: &u64| unreachable!("hit must not compute"));
        let mut forced = None;
        let (_, inserted) = submap
            .insert(&key, key.hash1(), key.hash2(), &mut compute, &mut forced)
            .map_err(|_| ())
            .unwrap();
        assert!(!inserted);
    }

    #[test]
    fn full_submap_is_surfaced() {
        let submap = Submap::new(5, 0.75);
        for key in 0..5 {
            assert!(insert(&submap, key, key).is_ok());
        }
        assert_eq!(submap.num_valid(), 5);
        assert!(insert(&submap, 100, 100).is_err());
        // Lookups of committed keys still succeed on a full submap.
        for key in 0..5 {
            assert_eq!(find(&submap, key), Some(key));
        }
    }

    #[test]
    fn overload_tracks_load_factor() {
        let submap: Submap<u64, u64> = Submap::new(11, 0.5);
        assert!(!submap.is_overloaded());
        for key in 0..6 {
            insert(&submap, key, key).unwrap();
        }
        assert!(submap.is_overloaded());
    }

    #[test]
    fn probe_increment_tours_all_buckets() {
        let submap: Submap<u64, u64> = Submap::new(11, 0.75);
        for hash2 in 0..100 {
            let increment = submap.probe_increment(hash2);
            assert!((1..11).contains(&increment));
        }
    }

    #[test]
    fn seek_walks_valid_buckets() {
        let submap = Submap::new(11, 0.75);
        assert_eq!(submap.seek(0), None);
        for key in 0..4 {
            insert(&submap, key, key).unwrap();
        }
        let mut index = 0;
        let mut seen = 0;
        while let Some(found) = submap.seek(index) {
            seen += 1;
            index = found + 1;
        }
        assert_eq!(seen, 4);
    }
}
