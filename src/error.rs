use crate::{key::Key, map::CapacityExceeded};
use thiserror::Error;

/// Error returned by [`Memo`](crate::memo::Memo) entry points.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error<K: Key> {
    /// Cycle detection found a prerequisite that is already on the
    /// detecting worker's evaluation stack.
    #[error("circular dependency detected ({} keys on the evaluation stack)", .stack.len())]
    CircularDependency {
        /// The detecting worker's key stack from bottom to top; the top is
        /// the key whose prerequisites were being gathered.
        stack: Vec<K>,
    },
    /// A read-only lookup found no memoized value for the key.
    #[error("value is not memoized and no compute function was supplied")]
    NotMemoized,
    /// A worker count below 1 was requested.
    #[error("the number of workers must be >= 1")]
    InvalidWorkerCount,
    /// The memo table cannot grow any further.
    #[error(transparent)]
    CapacityExceeded(#[from] CapacityExceeded),
}
