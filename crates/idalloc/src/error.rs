use crate::CounterKey;

/// A result type defaulting to the allocator's [`enum@Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors an allocator can surface to its caller.
///
/// Configuration errors are raised synchronously at construction and are only
/// fixed by building a new allocator. Every other variant is recoverable: the
/// allocator never enqueues anything from a failed replenishment, so the next
/// call is free to retry.
///
/// Lock poisoning never surfaces here. A store call that panics unwinds
/// through the caller that made it, and the allocator keeps serving later
/// calls because its state is only written after a successful replenishment.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A construction parameter violated its bound.
    #[error("invalid {field} {value}: {requirement}")]
    Configuration {
        /// Name of the offending parameter (`min_id` or `block_size`).
        field: &'static str,
        /// The rejected value.
        value: i64,
        /// Human readable bound the value had to satisfy.
        requirement: &'static str,
    },

    /// The backing store's increment primitive failed.
    #[error("backing store increment failed: {0}")]
    BackingStore(#[from] StoreError),

    /// Doubling the increment step while climbing past `min_id` would exceed
    /// the counter's range.
    #[error("increment step {step} cannot be doubled without overflowing the counter")]
    CounterOverflow {
        /// The last step that was successfully applied.
        step: i64,
    },
}

/// Failures reported by a [`CounterStore`](crate::CounterStore).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The allocator has no counter key to increment.
    #[error("no counter key configured")]
    MissingKey,

    /// The store refused the key.
    #[error("invalid counter key {key}")]
    InvalidKey {
        /// The rejected key.
        key: CounterKey,
    },

    /// Adding `delta` to the persisted value would overflow.
    #[error("incrementing counter {key} at {current} by {delta} overflows")]
    Overflow {
        /// Counter that was being incremented.
        key: CounterKey,
        /// Persisted value before the increment, left unchanged.
        current: i64,
        /// The increment that did not fit.
        delta: i64,
    },

    /// The store could not be reached or did not commit the increment.
    #[error("store unavailable: {reason}")]
    Unavailable {
        /// Store-specific description of the failure.
        reason: String,
    },

    /// Any other failure from an external store implementation.
    #[error(transparent)]
    Other(#[from] Box<dyn core::error::Error + Send + Sync + 'static>),
}
