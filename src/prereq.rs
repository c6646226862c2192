//! Prerequisite access objects handed to user callables.
//!
//! A compute function reads previously memoized values through a
//! [`Provider`]; a declare-prerequisites function announces keys through a
//! [`Gatherer`]. Both are thin worker-local views over the shared store
//! and the worker's evaluation stack.

use crate::{
    engine::stack::WorkerStack,
    key::{Key, Value},
    map::Store,
};
use core::{cell::RefCell, marker::PhantomData};

/// Read access to prerequisite values, passed to the compute function.
///
/// During normal evaluation every requested prerequisite is already
/// memoized and [`Provider::get`] returns the committed value. During
/// dry-run discovery a miss records the key as a prerequisite of the key
/// being discovered and returns a default-constructed sentinel instead;
/// values observed during a dry run must not be relied upon.
pub struct Provider<'a, K: Key, V: Value, S: Store<K, V>> {
    store: &'a S,
    mode: Mode<'a, K, V>,
}

enum Mode<'a, K: Key, V> {
    /// Every prerequisite is committed; a miss is a contract violation.
    Resolve,
    /// Record misses on the worker stack and hand out the sentinel.
    Discover {
        stack: &'a RefCell<WorkerStack<K>>,
        sentinel: &'a V,
    },
}

impl<'a, K: Key, V: Value, S: Store<K, V>> Provider<'a, K, V, S> {
    pub(crate) fn resolve(store: &'a S) -> Self {
        Self {
            store,
            mode: Mode::Resolve,
        }
    }

    pub(crate) fn discover(
        store: &'a S,
        stack: &'a RefCell<WorkerStack<K>>,
        sentinel: &'a V,
    ) -> Self {
        Self {
            store,
            mode: Mode::Discover { stack, sentinel },
        }
    }

    /// Returns the value memoized for a prerequisite key.
    ///
    /// # Panics
    /// Outside of dry-run discovery, requesting a key that is not
    /// memoized (one the compute function never announced as a
    /// prerequisite) is a contract violation and panics.
    pub fn get(&self, key: &K) -> &'a V {
        match &self.mode {
            Mode::Resolve => self.store.find(key).unwrap_or_else(|| {
                panic!("prerequisite {key:?} is not memoized; it was never declared or discovered")
            }),
            Mode::Discover { stack, sentinel } => match self.store.find(key) {
                Some(value) => value,
                None => {
                    stack.borrow_mut().push(key.clone());
                    *sentinel
                }
            },
        }
    }
}

/// Write access for announcing prerequisite keys, passed to the
/// declare-prerequisites function.
pub struct Gatherer<'a, K: Key, V: Value, S: Store<K, V>> {
    store: &'a S,
    stack: &'a RefCell<WorkerStack<K>>,
    _marker: PhantomData<fn() -> V>,
}

impl<'a, K: Key, V: Value, S: Store<K, V>> Gatherer<'a, K, V, S> {
    pub(crate) fn new(store: &'a S, stack: &'a RefCell<WorkerStack<K>>) -> Self {
        Self {
            store,
            stack,
            _marker: PhantomData,
        }
    }

    /// Announces `key` as a prerequisite of the key being discovered.
    ///
    /// Already-memoized keys are filtered out; announcing them again is a
    /// no-op. Announcement order affects scheduling only, never results.
    pub fn declare(&self, key: &K) {
        if self.store.find(key).is_none() {
            self.stack.borrow_mut().push(key.clone());
        }
    }
}
