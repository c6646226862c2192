//! The iterative topological evaluator driving each worker.

pub(crate) mod stack;

use self::stack::WorkerStack;
use crate::{
    error::Error,
    key::{Key, Value},
    map::Store,
    prereq::{Gatherer, Provider},
};
use core::cell::RefCell;

/// Runs one worker's evaluation loop to completion.
///
/// Every worker races through the same dependency graph against the
/// shared store. Each stack item is visited twice: the first visit marks
/// it ready and discovers its prerequisites (pushing the non-memoized
/// ones above it), the second visit computes and commits it. The first
/// worker to commit a key wins; racing workers' work on that key is
/// discarded by the store.
pub(crate) fn run_worker<K, V, S, F, D>(
    store: &S,
    worker_index: usize,
    root: &K,
    compute: &F,
    declare: Option<&D>,
    detect_cycles: bool,
) -> Result<(), Error<K>>
where
    K: Key,
    V: Value,
    S: Store<K, V>,
    F: Fn(&K, &Provider<'_, K, V, S>) -> V,
    D: Fn(&K, &Gatherer<'_, K, V, S>),
{
    let stack = RefCell::new(WorkerStack::new(worker_index, detect_cycles));
    if store.find(root).is_none() {
        let mut stack = stack.borrow_mut();
        stack.push(root.clone());
        stack.finalize_group();
    }

    loop {
        let (key, ready) = {
            let stack = stack.borrow();
            match stack.last() {
                None => break,
                Some(item) => (item.key.clone(), item.ready),
            }
        };

        if ready {
            // Second visit: every prerequisite is committed by now, either
            // by this worker or by a racing one. Compute and publish,
            // unless someone else already did.
            store.insert_with(key, |key| compute(key, &Provider::resolve(store)))?;
            stack.borrow_mut().pop();
            continue;
        }

        stack.borrow_mut().mark_ready();
        if store.find(&key).is_some() {
            // A racing worker committed the key after it was pushed; the
            // next iteration pops it through the no-op insert above.
            continue;
        }

        match declare {
            Some(declare) => {
                declare(&key, &Gatherer::new(store, &stack));
            }
            None => {
                // Dry-run the compute function to capture prerequisites.
                let sentinel = V::default();
                let provider = Provider::discover(store, &stack, &sentinel);
                let value = compute(&key, &provider);
                if let Some(cycle) = stack.borrow_mut().take_cycle() {
                    return Err(Error::CircularDependency { stack: cycle });
                }
                if stack.borrow().group_size() == 0 {
                    // Every prerequisite was already memoized, so the dry
                    // run was the real computation; commit it as-is.
                    store.insert_with(key, move |_| value)?;
                    stack.borrow_mut().pop();
                    continue;
                }
            }
        }
        if let Some(cycle) = stack.borrow_mut().take_cycle() {
            return Err(Error::CircularDependency { stack: cycle });
        }
        stack.borrow_mut().finalize_group();
    }

    Ok(())
}
