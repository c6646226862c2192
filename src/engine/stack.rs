use crate::{
    key::Key,
    types::{KeySet, TrackedKey},
};
use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};

/// A frame of the worker-local evaluation stack.
#[derive(Debug, Clone)]
pub(crate) struct StackItem<K> {
    pub(crate) key: K,
    /// `false` until the first visit discovers the item's prerequisites.
    pub(crate) ready: bool,
}

/// Worker-local DFS state.
///
/// Prerequisite pushes accumulate into a group that is reordered as a unit
/// by [`WorkerStack::finalize_group`]: worker 0 keeps the declaration
/// order, worker 1 reverses it, and workers >= 2 shuffle it with a
/// per-worker deterministically seeded generator. Racing workers thereby
/// descend through different parts of the frontier instead of contending
/// on the same keys, while a single-worker run stays fully deterministic.
pub(crate) struct WorkerStack<K: Key> {
    items: Vec<StackItem<K>>,
    /// Prerequisites pushed since the last group finalization.
    group_size: usize,
    worker_index: usize,
    rng: SmallRng,
    /// Keys currently on the stack; maintained only when cycle detection
    /// is enabled. Group keys enter at finalization, not at push, so a
    /// group may mention the key being discovered without tripping.
    on_stack: Option<KeySet<K>>,
    /// Snapshot taken when a push found its key already on the stack.
    cycle: Option<Vec<K>>,
}

impl<K: Key> WorkerStack<K> {
    pub(crate) fn new(worker_index: usize, detect_cycles: bool) -> Self {
        Self {
            items: Vec::new(),
            group_size: 0,
            worker_index,
            rng: SmallRng::seed_from_u64(worker_index as u64),
            on_stack: detect_cycles.then(KeySet::default),
            cycle: None,
        }
    }

    pub(crate) fn last(&self) -> Option<&StackItem<K>> {
        self.items.last()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn group_size(&self) -> usize {
        self.group_size
    }

    /// Appends `key` as a not-yet-ready item of the current group.
    ///
    /// With cycle detection enabled, a key already on the stack records a
    /// snapshot instead of growing the stack; the engine surfaces it once
    /// the in-flight user callback returns, and later pushes of the same
    /// callback are dropped.
    pub(crate) fn push(&mut self, key: K) {
        if self.cycle.is_some() {
            return;
        }
        if let Some(on_stack) = &self.on_stack {
            if on_stack.contains(&TrackedKey(key.clone())) {
                self.cycle = Some(self.items.iter().map(|item| item.key.clone()).collect());
                return;
            }
        }
        self.items.push(StackItem { key, ready: false });
        self.group_size += 1;
    }

    /// Marks the top item as discovered.
    pub(crate) fn mark_ready(&mut self) {
        self.items
            .last_mut()
            .expect("WorkerStack::mark_ready: [1]")
            .ready = true;
    }

    /// Pops the top item. Must not be called while a group is open.
    pub(crate) fn pop(&mut self) {
        debug_assert_eq!(self.group_size, 0, "WorkerStack::pop: open group");
        let item = self.items.pop().expect("WorkerStack::pop: [1]");
        if let Some(on_stack) = &mut self.on_stack {
            on_stack.remove(&TrackedKey(item.key));
        }
    }

    /// Commits the current group: reorders it according to the worker
    /// index and, with cycle detection enabled, marks its keys as on the
    /// stack.
    pub(crate) fn finalize_group(&mut self) {
        let group_start = self.items.len() - self.group_size;
        let group = &mut self.items[group_start..];
        match self.worker_index {
            0 => {}
            1 => group.reverse(),
            _ => {
                if group.len() > 1 {
                    group.shuffle(&mut self.rng);
                }
            }
        }
        if let Some(on_stack) = &mut self.on_stack {
            for item in &self.items[group_start..] {
                on_stack.insert(TrackedKey(item.key.clone()));
            }
        }
        self.group_size = 0;
    }

    /// Takes the pending cycle snapshot, if a push detected one.
    pub(crate) fn take_cycle(&mut self) -> Option<Vec<K>> {
        self.cycle.take()
    }
}
