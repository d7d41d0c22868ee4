use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[cfg(feature = "async-tokio")]
use crate::AsyncCounterStore;
use crate::{
    CounterKey, CounterStore, Result, StoreError,
    mutex::{Mutex, MutexGuard},
};

/// An in-process, linearizable [`CounterStore`].
///
/// Every counter lives in a single mutex-protected map, so increments are
/// totally ordered. Nothing survives the process; it stands in for the
/// replicated store in tests, benchmarks and single-node deployments.
///
/// The store also supports simple fault injection: [`MemoryStore::fail_next`]
/// makes the next `n` increments fail with [`StoreError::Unavailable`] without
/// touching any counter.
#[derive(Debug, Default)]
pub struct MemoryStore {
    counters: Mutex<HashMap<CounterKey, i64>>,
    pending_failures: AtomicUsize,
    round_trips: AtomicU64,
}

impl MemoryStore {
    /// Creates a store with no counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the persisted value of `key`, or `None` if it was never
    /// written.
    pub fn get(&self, key: &CounterKey) -> Result<Option<i64>, StoreError> {
        Ok(self.counters()?.get(key).copied())
    }

    /// Overwrites the persisted value of `key`.
    ///
    /// Useful for presetting a counter before an allocator is built on it.
    pub fn set(&self, key: CounterKey, value: i64) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey { key });
        }
        self.counters()?.insert(key, value);
        Ok(())
    }

    /// Fails the next `n` increments with [`StoreError::Unavailable`].
    pub fn fail_next(&self, n: usize) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Number of increment calls the store has served, failed ones included.
    pub fn round_trips(&self) -> u64 {
        self.round_trips.load(Ordering::Relaxed)
    }

    fn counters(&self) -> Result<MutexGuard<'_, HashMap<CounterKey, i64>>, StoreError> {
        #[cfg(feature = "parking-lot")]
        {
            Ok(self.counters.lock())
        }
        #[cfg(not(feature = "parking-lot"))]
        {
            self.counters.lock().map_err(|_| StoreError::Unavailable {
                reason: "counter map lock poisoned".into(),
            })
        }
    }

    fn take_injected_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl CounterStore for MemoryStore {
    fn increment(&self, key: &CounterKey, delta: i64) -> Result<i64, StoreError> {
        self.round_trips.fetch_add(1, Ordering::Relaxed);
        if key.is_empty() {
            return Err(StoreError::InvalidKey { key: key.clone() });
        }
        if self.take_injected_failure() {
            return Err(StoreError::Unavailable {
                reason: "injected failure".into(),
            });
        }

        let mut counters = self.counters()?;
        let current = counters.get(key).copied().unwrap_or(0);
        let next = current
            .checked_add(delta)
            .ok_or_else(|| StoreError::Overflow {
                key: key.clone(),
                current,
                delta,
            })?;
        counters.insert(key.clone(), next);
        Ok(next)
    }
}

#[cfg(feature = "async-tokio")]
impl AsyncCounterStore for MemoryStore {
    fn increment_async(
        &self,
        key: &CounterKey,
        delta: i64,
    ) -> impl Future<Output = Result<i64, StoreError>> + Send {
        let result = CounterStore::increment(self, key, delta);
        async move { result }
    }
}
