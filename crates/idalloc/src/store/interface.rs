use std::sync::Arc;

use crate::{CounterKey, Result, StoreError};

/// The atomic counter primitive an allocator draws blocks from.
///
/// `increment` adds `delta` to the counter named by `key`, treating an absent
/// counter as `0`, and returns the value after the addition. Implementations
/// must be linearizable across every caller sharing the key (including other
/// processes) and durable across restarts: an allocator that crashes resumes
/// from the last increment that was acknowledged.
///
/// # Example
///
/// ```
/// use idalloc::{CounterKey, CounterStore, StoreError};
/// use std::sync::atomic::{AtomicI64, Ordering};
///
/// struct Single(AtomicI64);
/// impl CounterStore for Single {
///     fn increment(&self, _key: &CounterKey, delta: i64) -> Result<i64, StoreError> {
///         Ok(self.0.fetch_add(delta, Ordering::SeqCst) + delta)
///     }
/// }
///
/// let store = Single(AtomicI64::new(0));
/// assert_eq!(store.increment(&CounterKey::new("k"), 10).unwrap(), 10);
/// ```
pub trait CounterStore {
    /// Atomically adds `delta` and returns the resulting value.
    fn increment(&self, key: &CounterKey, delta: i64) -> Result<i64, StoreError>;
}

impl<S> CounterStore for &S
where
    S: CounterStore + ?Sized,
{
    fn increment(&self, key: &CounterKey, delta: i64) -> Result<i64, StoreError> {
        (**self).increment(key, delta)
    }
}

impl<S> CounterStore for Arc<S>
where
    S: CounterStore + ?Sized,
{
    fn increment(&self, key: &CounterKey, delta: i64) -> Result<i64, StoreError> {
        (**self).increment(key, delta)
    }
}

/// Async flavor of [`CounterStore`] for stores reached over the network.
///
/// The contract is identical; only the shape of the call differs.
#[cfg_attr(docsrs, doc(cfg(feature = "async-tokio")))]
#[cfg(feature = "async-tokio")]
pub trait AsyncCounterStore {
    /// Returns a future resolving to the counter value after adding `delta`.
    fn increment_async(
        &self,
        key: &CounterKey,
        delta: i64,
    ) -> impl Future<Output = Result<i64, StoreError>> + Send;
}

#[cfg(feature = "async-tokio")]
impl<S> AsyncCounterStore for Arc<S>
where
    S: AsyncCounterStore + Send + Sync + ?Sized,
{
    fn increment_async(
        &self,
        key: &CounterKey,
        delta: i64,
    ) -> impl Future<Output = Result<i64, StoreError>> + Send {
        (**self).increment_async(key, delta)
    }
}
