//! Public façade: configuration and entry points.

use crate::{
    engine::run_worker,
    error::Error,
    key::{Key, Value},
    map::{MemoMap, Store, DEFAULT_MAX_LOAD_FACTOR, DEFAULT_MAX_SUBMAPS},
    prereq::{Gatherer, Provider},
};
use core::marker::PhantomData;
use derive_more::Debug;
use std::{panic, thread};

/// Configuration of a [`Memo`].
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// Workers spawned when an entry point does not specify a count.
    pub default_workers: usize,
    /// Sizes the memo table's first submap.
    pub estimated_entries: usize,
    /// Enables per-worker on-stack tracking and
    /// [`Error::CircularDependency`].
    pub detect_cycles: bool,
    /// Per-submap growth trigger, in the open interval `(0, 1)`.
    pub max_load_factor: f64,
    /// Cap on submap appends.
    pub max_submaps: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            default_workers: 1,
            estimated_entries: 0,
            detect_cycles: false,
            max_load_factor: DEFAULT_MAX_LOAD_FACTOR,
            max_submaps: DEFAULT_MAX_SUBMAPS,
        }
    }
}

/// Stand-in declare type for the dry-run entry points.
type NoDeclare<K, V, S> = fn(&K, &Gatherer<'_, K, V, S>);

/// Parallel memoization façade.
///
/// Owns the shared store and evaluates requested keys by racing worker
/// threads through their dependency graphs. Workers share nothing but the
/// store; per-worker stacks, on-stack sets, and generators are
/// thread-local.
///
/// The compute function must be pure: its result may depend only on the
/// key and on prerequisite values read through the provided
/// [`Provider`]. Racing workers may invoke it multiple times per key, and
/// all committed results for a key must compare equal.
#[must_use]
#[derive(Debug)]
pub struct Memo<K: Key, V: Value, S: Store<K, V> = MemoMap<K, V>> {
    store: S,
    default_workers: usize,
    detect_cycles: bool,
    #[debug(skip)]
    _marker: PhantomData<fn(K) -> V>,
}

impl<K: Key, V: Value> Memo<K, V> {
    /// Creates a façade backed by a fresh [`MemoMap`] sized for
    /// `estimated_entries`.
    ///
    /// # Errors
    /// [`Error::InvalidWorkerCount`] if `default_workers` is zero.
    pub fn new(
        default_workers: usize,
        estimated_entries: usize,
        detect_cycles: bool,
    ) -> Result<Self, Error<K>> {
        Self::with_options(Options {
            default_workers,
            estimated_entries,
            detect_cycles,
            ..Options::default()
        })
    }

    /// Creates a façade from full [`Options`].
    ///
    /// # Errors
    /// [`Error::InvalidWorkerCount`] if `options.default_workers` is zero.
    ///
    /// # Panics
    /// If `max_load_factor` or `max_submaps` is invalid; see
    /// [`MemoMap::with_settings`].
    pub fn with_options(options: Options) -> Result<Self, Error<K>> {
        let store = MemoMap::with_settings(
            options.estimated_entries,
            options.max_load_factor,
            options.max_submaps,
        );
        Self::with_store(store, options.default_workers, options.detect_cycles)
    }
}

impl<K: Key, V: Value> Default for Memo<K, V> {
    fn default() -> Self {
        Self {
            store: MemoMap::new(0),
            default_workers: 1,
            detect_cycles: false,
            _marker: PhantomData,
        }
    }
}

impl<K: Key, V: Value, S: Store<K, V>> Memo<K, V, S> {
    /// Creates a façade over a caller-provided store, e.g. an array-backed
    /// one for a dense key space.
    ///
    /// # Errors
    /// [`Error::InvalidWorkerCount`] if `default_workers` is zero.
    pub fn with_store(store: S, default_workers: usize, detect_cycles: bool) -> Result<Self, Error<K>> {
        if default_workers < 1 {
            return Err(Error::InvalidWorkerCount);
        }
        Ok(Self {
            store,
            default_workers,
            detect_cycles,
            _marker: PhantomData,
        })
    }

    /// The shared store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Workers spawned when an entry point does not specify a count.
    #[must_use]
    pub fn default_workers(&self) -> usize {
        self.default_workers
    }

    /// Sets the default worker count.
    ///
    /// # Errors
    /// [`Error::InvalidWorkerCount`] if `workers` is zero.
    pub fn set_default_workers(&mut self, workers: usize) -> Result<(), Error<K>> {
        if workers < 1 {
            return Err(Error::InvalidWorkerCount);
        }
        self.default_workers = workers;
        Ok(())
    }

    /// Whether workers track their stacks for circular dependencies.
    #[must_use]
    pub fn cycle_detection_enabled(&self) -> bool {
        self.detect_cycles
    }

    /// Enables or disables cycle detection for subsequent evaluations.
    pub fn set_cycle_detection(&mut self, detect_cycles: bool) {
        self.detect_cycles = detect_cycles;
    }

    /// Returns the memoized value of `key`.
    ///
    /// # Errors
    /// [`Error::NotMemoized`] if `key` has not been evaluated.
    pub fn get(&self, key: &K) -> Result<V, Error<K>> {
        self.store.find(key).cloned().ok_or(Error::NotMemoized)
    }

    /// Returns the value of `key`, evaluating it with `compute` and the
    /// default worker count if absent.
    ///
    /// Prerequisites are discovered by dry-running `compute` against a
    /// sentinel-returning provider.
    ///
    /// # Errors
    /// See [`Error`].
    pub fn get_or_compute<F>(&self, key: &K, compute: F) -> Result<V, Error<K>>
    where
        F: Fn(&K, &Provider<'_, K, V, S>) -> V + Sync,
    {
        self.get_or_compute_with(key, compute, self.default_workers)
    }

    /// [`Memo::get_or_compute`] with an explicit worker count.
    ///
    /// # Errors
    /// See [`Error`].
    pub fn get_or_compute_with<F>(&self, key: &K, compute: F, workers: usize) -> Result<V, Error<K>>
    where
        F: Fn(&K, &Provider<'_, K, V, S>) -> V + Sync,
    {
        self.evaluate(key, &compute, None::<&NoDeclare<K, V, S>>, workers)
    }

    /// Returns the value of `key`, evaluating it with `compute` and the
    /// default worker count if absent; prerequisites are announced by
    /// `declare` instead of being discovered by dry runs.
    ///
    /// `declare` must be deterministic in the set of keys it announces;
    /// announcement order affects scheduling only.
    ///
    /// # Errors
    /// See [`Error`].
    pub fn get_or_compute_declared<F, D>(&self, key: &K, compute: F, declare: D) -> Result<V, Error<K>>
    where
        F: Fn(&K, &Provider<'_, K, V, S>) -> V + Sync,
        D: Fn(&K, &Gatherer<'_, K, V, S>) + Sync,
    {
        self.evaluate(key, &compute, Some(&declare), self.default_workers)
    }

    /// [`Memo::get_or_compute_declared`] with an explicit worker count.
    ///
    /// # Errors
    /// See [`Error`].
    pub fn get_or_compute_declared_with<F, D>(
        &self,
        key: &K,
        compute: F,
        declare: D,
        workers: usize,
    ) -> Result<V, Error<K>>
    where
        F: Fn(&K, &Provider<'_, K, V, S>) -> V + Sync,
        D: Fn(&K, &Gatherer<'_, K, V, S>) + Sync,
    {
        self.evaluate(key, &compute, Some(&declare), workers)
    }

    fn evaluate<F, D>(
        &self,
        key: &K,
        compute: &F,
        declare: Option<&D>,
        workers: usize,
    ) -> Result<V, Error<K>>
    where
        F: Fn(&K, &Provider<'_, K, V, S>) -> V + Sync,
        D: Fn(&K, &Gatherer<'_, K, V, S>) + Sync,
    {
        if workers < 1 {
            return Err(Error::InvalidWorkerCount);
        }
        if let Some(value) = self.store.find(key) {
            return Ok(value.clone());
        }

        if workers == 1 {
            run_worker(&self.store, 0, key, compute, declare, self.detect_cycles)?;
        } else {
            let first_error = thread::scope(|scope| {
                let handles: Vec<_> = (0..workers)
                    .map(|worker_index| {
                        scope.spawn(move || {
                            run_worker(
                                &self.store,
                                worker_index,
                                key,
                                compute,
                                declare,
                                self.detect_cycles,
                            )
                        })
                    })
                    .collect();
                let mut first_error = None;
                for handle in handles {
                    match handle.join() {
                        Ok(Ok(())) => {}
                        Ok(Err(error)) => first_error = first_error.or(Some(error)),
                        // A user callable panicked; re-raise on the caller.
                        Err(payload) => panic::resume_unwind(payload),
                    }
                }
                first_error
            });
            if let Some(error) = first_error {
                return Err(error);
            }
        }

        self.get(key)
    }
}
