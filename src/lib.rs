//! Generic parallel memoization over dependency graphs.
//!
//! This crate evaluates a user-supplied pure function `compute(key)` over a
//! directed acyclic graph of keys, caching every result in a shared
//! append-only, almost lock-free memo table and racing multiple worker
//! threads through independent subgraphs. It:
//! - Discovers prerequisites on demand, either from an explicit
//!   declare-prerequisites function or by dry-running `compute` against a
//!   sentinel-returning provider.
//! - Coordinates racing workers without locks on the hot path: buckets
//!   move `EMPTY -> BUSY -> VALID` exactly once, and duplicated concurrent
//!   computation of the same key is benign because committed values are a
//!   function of the key alone.
//! - Grows the memo table by appending prime-capacity submaps rather than
//!   rehashing, so committed entries never move and references stay valid.
//! - Optionally detects circular dependencies per worker and reports the
//!   offending key stack.
//!
//! Key modules:
//! - `key`: the [`Key`]/[`Value`] contracts binding user types to the
//!   engine.
//! - `map`: the concurrent memo table and the [`Store`] seam for plugging
//!   in alternative backends.
//! - `prereq`: the [`Provider`]/[`Gatherer`] access objects handed to user
//!   callables.
//! - `memo`: the [`Memo`] façade with the entry points.
//!
//! Quick start:
//! 1. Pick a key type implementing [`Key`] (primitive integers are
//!    provided) and a value type satisfying [`Value`].
//! 2. Call [`Memo::get_or_compute`] with a compute function that reads its
//!    prerequisites through the provider, or
//!    [`Memo::get_or_compute_declared`] to announce prerequisites
//!    explicitly.
//!
//! ```
//! use parmemo::Memo;
//!
//! let memo: Memo<u64, u64> = Memo::new(1, 0, false)?;
//! let fib = memo.get_or_compute(&30, |&i, prereqs| match i {
//!     0 => 0,
//!     1 | 2 => 1,
//!     _ => prereqs.get(&(i - 1)) + prereqs.get(&(i - 2)),
//! })?;
//! assert_eq!(fib, 832_040);
//! # Ok::<(), parmemo::Error<u64>>(())
//! ```

/// The iterative topological evaluator and the worker-local stack.
mod engine;
/// Error types surfaced by the façade.
///
/// Exposes [`Error`], covering circular dependencies, reads of absent
/// values, invalid worker counts, and memo-table capacity exhaustion.
pub mod error;
/// Key and value contracts.
///
/// Defines the [`Key`] trait (equality plus two independent hash
/// functions) and the blanket [`Value`] marker bound.
pub mod key;
/// The concurrent memo table.
///
/// Contains [`MemoMap`] (append-only submaps, double-hashing probes,
/// lock-free insert/find) and the [`Store`] abstraction the engine runs
/// against.
pub mod map;
/// The public façade.
///
/// [`Memo`] holds the shared store, validates configuration, and spawns
/// the racing workers behind the `get*` entry points.
pub mod memo;
/// Prerequisite access objects passed to user callables.
///
/// [`Provider`] reads memoized prerequisite values (with a dry-run mode
/// that records misses); [`Gatherer`] collects explicitly declared
/// prerequisite keys.
pub mod prereq;
mod sync;
mod types;

pub use crate::{
    error::Error,
    key::{Key, Value},
    map::{CapacityExceeded, MapStats, MemoMap, Store, SubmapStats},
    memo::{Memo, Options},
    prereq::{Gatherer, Provider},
};
