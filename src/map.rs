//! The concurrent memo table.
//!
//! An append-only map of committed `(key, value)` entries shared by all
//! workers. It grows by appending new prime-capacity submaps instead of
//! rehashing, so committed entries are never moved and references handed
//! out stay valid for the map's lifetime. Lookups and inserts are
//! lock-free; the only blocking primitive is the single-writer latch
//! serializing submap appends.

mod iter;
mod submap;

pub use self::iter::Iter;

use self::submap::{Entry, Submap, SubmapFull};
use crate::{
    key::{Key, Value},
    sync::{yield_now, AtomicBool, AtomicUsize, Ordering},
    types::SyncUnsafeCell,
};
use core::fmt::{self, Debug, Formatter};
use thiserror::Error;

/// Default maximum load factor of each submap.
pub const DEFAULT_MAX_LOAD_FACTOR: f64 = 0.75;

/// Default cap on the number of submaps.
pub const DEFAULT_MAX_SUBMAPS: usize = 128;

/// Minimum capacity of the first submap.
#[cfg(not(feature = "loom"))]
const FIRST_SUBMAP_MIN_CAPACITY: usize = 65_537;
/// Tiny floor under loom so the model checker can explore the table
/// exhaustively.
#[cfg(feature = "loom")]
const FIRST_SUBMAP_MIN_CAPACITY: usize = 7;

/// Headroom applied to the estimated entry count when sizing the first
/// submap.
const FIRST_SUBMAP_HEADROOM: f64 = 1.03;

/// Each appended submap's capacity is the next prime at or above the
/// previous capacity multiplied by this factor.
const SUBMAP_GROWTH_FACTOR: usize = 8;

/// The memo table reached its configured maximum number of submaps.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("reached the maximum number of submaps: {max_submaps}")]
pub struct CapacityExceeded {
    /// The configured submap cap.
    pub max_submaps: usize,
}

/// Storage abstraction the evaluation engine runs against.
///
/// [`MemoMap`] is the default implementor. Callers with a dense key space
/// can substitute an array-backed store through
/// [`Memo::with_store`](crate::memo::Memo::with_store).
///
/// Implementations must uphold functional determinism: once a value is
/// committed for a key, every later `find` and `insert_with` for that key
/// observes an equal value.
pub trait Store<K: Key, V: Value>: Send + Sync {
    /// Returns a reference to the memoized value for `key`, if present.
    ///
    /// Never blocks. May miss an entry that is concurrently being
    /// committed; the caller either finds it later or races the insert
    /// and loses.
    fn find(&self, key: &K) -> Option<&V>;

    /// Commits `compute(&key)` for `key` unless an entry is already
    /// present.
    ///
    /// `compute` is invoked at most once per call, and only if a free slot
    /// is actually up for claiming. Returns the committed (or
    /// pre-existing) value and whether this call inserted it.
    fn insert_with<F>(&self, key: K, compute: F) -> Result<(&V, bool), CapacityExceeded>
    where
        F: FnOnce(&K) -> V;

    /// Visits every committed entry in unspecified order.
    fn for_each(&self, f: impl FnMut(&K, &V));
}

/// Statistics of a single submap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubmapStats {
    /// Bucket count.
    pub capacity: usize,
    /// Committed buckets.
    pub num_valid: usize,
    /// `num_valid / capacity`.
    pub load_factor: f64,
}

/// Statistics of a [`MemoMap`].
#[derive(Debug, Clone, PartialEq)]
pub struct MapStats {
    /// Published submaps.
    pub num_submaps: usize,
    /// Committed entries across all submaps, duplicates included.
    pub num_entries: usize,
    /// Per-submap statistics, oldest first.
    pub submaps: Vec<SubmapStats>,
}

type SubmapSlot<K, V> = SyncUnsafeCell<Option<Box<Submap<K, V>>>>;

/// An almost lock-free concurrent memoization map.
///
/// Entries can be inserted and found but never erased or updated. The
/// presence of duplicate keys is avoided but not ruled out; this is
/// harmless as long as the value committed for a key is a function of the
/// key alone, which is the contract of every compute function handed to
/// this crate.
#[must_use]
pub struct MemoMap<K: Key, V> {
    /// Submap slots, length `max_submaps`. Slot `i` is written once,
    /// behind the `expanding` latch, before `num_submaps` is
    /// release-incremented past `i`.
    slots: Box<[SubmapSlot<K, V>]>,
    num_submaps: AtomicUsize,
    num_entries: AtomicUsize,
    /// Single-writer expansion latch.
    expanding: AtomicBool,
    max_load_factor: f64,
}

impl<K: Key, V> MemoMap<K, V> {
    /// Creates a map sized for `estimated_entries`, with the default load
    /// factor and submap cap.
    pub fn new(estimated_entries: usize) -> Self {
        Self::with_settings(estimated_entries, DEFAULT_MAX_LOAD_FACTOR, DEFAULT_MAX_SUBMAPS)
    }

    /// Creates a map with explicit sizing parameters.
    ///
    /// # Panics
    /// If `max_load_factor` lies outside the open interval `(0, 1)` or
    /// `max_submaps` is zero.
    pub fn with_settings(estimated_entries: usize, max_load_factor: f64, max_submaps: usize) -> Self {
        assert!(
            max_load_factor > 0.0 && max_load_factor < 1.0,
            "MemoMap: the maximum load factor must lie in (0, 1)"
        );
        assert!(max_submaps >= 1, "MemoMap: the maximum number of submaps must be >= 1");
        let sized = (FIRST_SUBMAP_HEADROOM * estimated_entries as f64 / max_load_factor) as usize;
        let first_capacity = next_prime(sized).max(FIRST_SUBMAP_MIN_CAPACITY);
        let mut slots: Vec<SubmapSlot<K, V>> =
            (0..max_submaps).map(|_| SyncUnsafeCell::new(None)).collect();
        slots[0] = SyncUnsafeCell::new(Some(Box::new(Submap::new(first_capacity, max_load_factor))));
        Self {
            slots: slots.into_boxed_slice(),
            num_submaps: AtomicUsize::new(1),
            num_entries: AtomicUsize::new(0),
            expanding: AtomicBool::new(false),
            max_load_factor,
        }
    }

    /// The configured cap on submap appends.
    #[must_use]
    pub fn max_submaps(&self) -> usize {
        self.slots.len()
    }

    /// Number of committed entries, duplicates of the same key across
    /// submaps included. Relaxed counter; exact after quiescence.
    #[must_use]
    pub fn len(&self) -> usize {
        self.num_entries.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn num_submaps(&self) -> usize {
        self.num_submaps.load(Ordering::Acquire)
    }

    /// Returns the submap at `index`.
    ///
    /// # Safety
    /// `index` must be below a value previously loaded from `num_submaps`
    /// with acquire ordering.
    unsafe fn submap_unchecked(&self, index: usize) -> &Submap<K, V> {
        self.slots[index].with(|slot| {
            // SAFETY: submap `index` was fully constructed before
            // `num_submaps` was release-incremented past it, and a
            // published slot is never rewritten.
            unsafe { (*slot).as_ref().unwrap() }
        })
    }

    /// Returns a reference to the memoized value for `key`, if present.
    ///
    /// The reference stays valid for the map's lifetime: entries are never
    /// moved, updated, or reclaimed.
    #[must_use]
    pub fn find(&self, key: &K) -> Option<&V> {
        let entry = self.find_entry(key, key.hash1(), key.hash2(), self.num_submaps())?;
        Some(&entry.value)
    }

    /// Scans the submaps `[0, num_submaps)`, newest first.
    fn find_entry(
        &self,
        key: &K,
        hash1: u64,
        hash2: u64,
        num_submaps: usize,
    ) -> Option<&Entry<K, V>> {
        for submap_index in (0..num_submaps).rev() {
            // SAFETY: `submap_index < num_submaps` per the caller's acquire
            // load.
            let submap = unsafe { self.submap_unchecked(submap_index) };
            if let Some(bucket_index) = submap.find(key, hash1, hash2) {
                // SAFETY: `find` observed `VALID` behind an acquire fence.
                return Some(unsafe { submap.entry_unchecked(bucket_index) });
            }
        }
        None
    }

    /// Commits `compute(&key)` for `key` unless an entry is already
    /// present.
    ///
    /// `compute` is invoked at most once per call, lazily, when the probe
    /// first reaches a claimable bucket. Returns the committed (or
    /// pre-existing) value and whether this call inserted it.
    ///
    /// # Errors
    /// [`CapacityExceeded`] when committing would require appending a
    /// submap beyond the configured cap.
    pub fn insert_with<F>(&self, key: K, compute: F) -> Result<(&V, bool), CapacityExceeded>
    where
        F: FnOnce(&K) -> V,
    {
        let hash1 = key.hash1();
        let hash2 = key.hash2();
        let mut compute = Some(compute);
        let mut value = None;
        loop {
            let num_submaps = self.num_submaps();
            // A hit in any sealed submap makes the insert a no-op.
            if num_submaps > 1 {
                if let Some(entry) = self.find_entry(&key, hash1, hash2, num_submaps - 1) {
                    return Ok((&entry.value, false));
                }
            }
            // SAFETY: `num_submaps - 1 < num_submaps` per the acquire load
            // above.
            let last = unsafe { self.submap_unchecked(num_submaps - 1) };
            if last.is_overloaded() {
                self.expand()?;
                continue;
            }
            match last.insert(&key, hash1, hash2, &mut compute, &mut value) {
                Ok((bucket_index, inserted)) => {
                    if inserted {
                        self.num_entries.fetch_add(1, Ordering::Relaxed);
                    }
                    // SAFETY: `insert` returned a bucket it observed
                    // `VALID`.
                    let entry = unsafe { last.entry_unchecked(bucket_index) };
                    return Ok((&entry.value, inserted));
                }
                Err(SubmapFull) => self.expand()?,
            }
        }
    }

    /// Inserts a ready-made value; shorthand for [`MemoMap::insert_with`]
    /// with a closure returning `value`.
    ///
    /// # Errors
    /// See [`MemoMap::insert_with`].
    pub fn insert(&self, key: K, value: V) -> Result<(&V, bool), CapacityExceeded> {
        self.insert_with(key, move |_| value)
    }

    /// Appends a new submap.
    fn expand(&self) -> Result<(), CapacityExceeded> {
        // Single-writer latch; contenders spin-yield.
        while self.expanding.swap(true, Ordering::Acquire) {
            yield_now();
        }
        let result = self.expand_locked();
        self.expanding.store(false, Ordering::Release);
        result
    }

    fn expand_locked(&self) -> Result<(), CapacityExceeded> {
        let num_submaps = self.num_submaps();
        // SAFETY: acquire load above.
        let last = unsafe { self.submap_unchecked(num_submaps - 1) };
        // Another thread may have expanded while this one was spinning on
        // the latch.
        if !last.is_overloaded() {
            return Ok(());
        }
        if num_submaps == self.max_submaps() {
            return Err(CapacityExceeded {
                max_submaps: self.max_submaps(),
            });
        }
        let capacity = next_prime(last.capacity() * SUBMAP_GROWTH_FACTOR);
        let submap = Box::new(Submap::new(capacity, self.max_load_factor));
        self.slots[num_submaps].with_mut(|slot| {
            // SAFETY: the `expanding` latch makes this thread the only
            // writer of the slot, and readers do not touch slots at or
            // above the `num_submaps` they loaded.
            unsafe { *slot = Some(submap) };
        });
        self.num_submaps.fetch_add(1, Ordering::Release);
        Ok(())
    }

    /// Iterates over the committed entries; see [`Iter`] for the
    /// consistency model.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(self)
    }

    /// Statistics snapshot; counters are relaxed and exact only after
    /// quiescence.
    #[must_use]
    pub fn stats(&self) -> MapStats {
        let num_submaps = self.num_submaps();
        let submaps = (0..num_submaps)
            .map(|index| {
                // SAFETY: `index < num_submaps` per the acquire load above.
                let submap = unsafe { self.submap_unchecked(index) };
                SubmapStats {
                    capacity: submap.capacity(),
                    num_valid: submap.num_valid(),
                    load_factor: submap.num_valid() as f64 / submap.capacity() as f64,
                }
            })
            .collect();
        MapStats {
            num_submaps,
            num_entries: self.len(),
            submaps,
        }
    }
}

impl<K: Key, V: Value> MemoMap<K, V> {
    /// Copies the entries satisfying `predicate` into a fresh map.
    /// Duplicates collapse in the copy.
    ///
    /// # Errors
    /// [`CapacityExceeded`] if the copy outgrows the submap cap.
    pub fn filter(&self, mut predicate: impl FnMut(&K, &V) -> bool) -> Result<Self, CapacityExceeded> {
        let filtered = Self::with_settings(self.len(), self.max_load_factor, self.max_submaps());
        for (key, value) in self {
            if predicate(key, value) {
                filtered.insert(key.clone(), value.clone())?;
            }
        }
        Ok(filtered)
    }

    /// Deep copy of the map; duplicates collapse.
    ///
    /// # Errors
    /// See [`MemoMap::filter`].
    pub fn duplicate(&self) -> Result<Self, CapacityExceeded> {
        self.filter(|_, _| true)
    }
}

impl<K: Key, V: Value> Store<K, V> for MemoMap<K, V> {
    fn find(&self, key: &K) -> Option<&V> {
        MemoMap::find(self, key)
    }

    fn insert_with<F>(&self, key: K, compute: F) -> Result<(&V, bool), CapacityExceeded>
    where
        F: FnOnce(&K) -> V,
    {
        MemoMap::insert_with(self, key, compute)
    }

    fn for_each(&self, mut f: impl FnMut(&K, &V)) {
        for (key, value) in self {
            f(key, value);
        }
    }
}

impl<K: Key, V> Debug for MemoMap<K, V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoMap")
            .field("num_submaps", &self.num_submaps())
            .field("num_entries", &self.len())
            .finish_non_exhaustive()
    }
}

/// Returns `true` for odd `n >= 3` with no odd divisor below the square
/// root. Callers never pass even numbers.
fn is_prime(n: usize) -> bool {
    let mut divisor = 3;
    loop {
        let quotient = n / divisor;
        if quotient < divisor {
            return true;
        }
        if n == quotient * divisor {
            return false;
        }
        divisor += 2;
    }
}

/// Smallest prime at or above `n` (for odd `n`; even `n` is bumped first).
fn next_prime(mut n: usize) -> usize {
    if n <= 2 {
        return 2;
    }
    if n % 2 == 0 {
        n += 1;
    }
    while !is_prime(n) {
        n += 2;
    }
    n
}
