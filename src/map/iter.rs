use super::MemoMap;
use crate::key::Key;

/// Iterator over the committed entries of a [`MemoMap`].
///
/// The iterator is weakly consistent:
/// - it never yields a torn or uncommitted entry,
/// - it may miss entries committed after it was created,
/// - it may yield the same key more than once when racing workers left
///   duplicates in different submaps (their values compare equal by
///   functional determinism).
///
/// Concurrent inserts never invalidate it: entries are never moved or
/// reclaimed, and submaps published after creation are simply not visited.
#[must_use]
pub struct Iter<'a, K: Key, V> {
    map: &'a MemoMap<K, V>,
    num_submaps: usize,
    submap_index: usize,
    bucket_index: usize,
}

impl<'a, K: Key, V> Iter<'a, K, V> {
    pub(super) fn new(map: &'a MemoMap<K, V>) -> Self {
        Self {
            map,
            num_submaps: map.num_submaps(),
            submap_index: 0,
            bucket_index: 0,
        }
    }
}

impl<'a, K: Key, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let map = self.map;
        while self.submap_index < self.num_submaps {
            // SAFETY: `submap_index < num_submaps` was observed with
            // acquire ordering when the iterator was created.
            let submap = unsafe { map.submap_unchecked(self.submap_index) };
            match submap.seek(self.bucket_index) {
                Some(index) => {
                    self.bucket_index = index + 1;
                    // SAFETY: `seek` observed `VALID` behind an acquire
                    // fence.
                    let entry = unsafe { submap.entry_unchecked(index) };
                    return Some((&entry.key, &entry.value));
                }
                None => {
                    self.submap_index += 1;
                    self.bucket_index = 0;
                }
            }
        }
        None
    }
}

impl<'a, K: Key, V> IntoIterator for &'a MemoMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
