use tokio::sync::Mutex;
#[cfg(feature = "tracing")]
use tracing::instrument;

use super::block::{Block, Replenish};
use crate::{AsyncCounterStore, CounterKey, IdAllocatorConfig, Result, StoreError};

#[derive(Debug)]
struct State {
    key: Option<CounterKey>,
    buffer: Block,
}

/// Async counterpart of [`IdAllocator`](crate::IdAllocator) for stores
/// reached through an [`AsyncCounterStore`].
///
/// The single-flight guard is a [`tokio::sync::Mutex`], so a task waiting on
/// another task's replenishment yields to the runtime instead of blocking a
/// worker thread. Semantics are otherwise identical to the blocking
/// allocator.
///
/// # Example
/// ```
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// use idalloc::{AsyncIdAllocator, MemoryStore, NODE_ID_GENERATOR};
///
/// let allocator =
///     AsyncIdAllocator::new(Some(NODE_ID_GENERATOR), MemoryStore::new(), 1, 10).unwrap();
/// assert_eq!(allocator.allocate().await.unwrap(), 1);
/// # });
/// ```
pub struct AsyncIdAllocator<S>
where
    S: AsyncCounterStore,
{
    state: Mutex<State>,
    store: S,
    min_id: i64,
    block_size: i64,
}

impl<S> AsyncIdAllocator<S>
where
    S: AsyncCounterStore,
{
    /// Creates an allocator; see [`IdAllocator::new`](crate::IdAllocator::new).
    ///
    /// # Errors
    /// [`Error::Configuration`](crate::Error::Configuration) if `min_id <= 0`
    /// or `block_size < 1`.
    pub fn new(
        counter_key: Option<CounterKey>,
        store: S,
        min_id: i64,
        block_size: i64,
    ) -> Result<Self> {
        Self::with_config(
            counter_key,
            store,
            IdAllocatorConfig::new(min_id, block_size),
        )
    }

    /// # Errors
    /// See [`IdAllocatorConfig::validate`].
    pub fn with_config(
        counter_key: Option<CounterKey>,
        store: S,
        config: IdAllocatorConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: Mutex::new(State {
                key: counter_key,
                buffer: Block::default(),
            }),
            store,
            min_id: config.min_id,
            block_size: config.block_size,
        })
    }

    /// Smallest ID this allocator hands out.
    pub fn min_id(&self) -> i64 {
        self.min_id
    }

    /// Nominal number of IDs requested per store round trip.
    pub fn block_size(&self) -> i64 {
        self.block_size
    }

    /// Returns the backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the counter key the next replenishment will increment.
    pub async fn counter_key(&self) -> Option<CounterKey> {
        self.state.lock().await.key.clone()
    }

    /// Repoints the allocator at another counter, or at none.
    ///
    /// Buffered IDs are kept and still dispensed first. Waits for an in-flight
    /// replenishment to finish.
    pub async fn set_counter_key(&self, counter_key: Option<CounterKey>) {
        self.state.lock().await.key = counter_key;
    }

    /// Number of IDs fetched but not yet dispensed.
    pub async fn buffered(&self) -> u64 {
        self.state.lock().await.buffer.len()
    }

    /// Resolves to the next ID, replenishing from the store when the buffer
    /// is empty.
    ///
    /// # Errors
    /// - [`Error::BackingStore`](crate::Error::BackingStore) on store failure
    ///   or a missing key.
    /// - [`Error::CounterOverflow`](crate::Error::CounterOverflow) if
    ///   `min_id` cannot be cleared.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub async fn allocate(&self) -> Result<i64> {
        let mut state = self.state.lock().await;
        if let Some(id) = state.buffer.pop() {
            return Ok(id);
        }
        let (first, last) = self.replenish(state.key.as_ref()).await?;
        Ok(state.buffer.refill_and_pop(first, last))
    }

    /// Runs one replenishment. Only called with the state lock held.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    async fn replenish(&self, key: Option<&CounterKey>) -> Result<(i64, i64)> {
        let key = key.ok_or(StoreError::MissingKey)?;
        let mut round = Replenish::new(self.min_id, self.block_size);
        loop {
            let step = round.step();
            let new_value = match self.store.increment_async(key, step).await {
                Ok(value) => value,
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(%key, step, error = %e, "counter increment failed");
                    return Err(e.into());
                }
            };
            #[cfg(feature = "tracing")]
            tracing::debug!(%key, step, new_value, "counter incremented");

            if let Some(range) = round.observe(new_value)? {
                return Ok(range);
            }
        }
    }
}

impl<S> core::fmt::Debug for AsyncIdAllocator<S>
where
    S: AsyncCounterStore,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AsyncIdAllocator")
            .field("min_id", &self.min_id)
            .field("block_size", &self.block_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use futures::future::try_join_all;

    use super::*;
    use crate::{Error, IdAllocatorConfig, MemoryStore, RANGE_ID_GENERATOR};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_tasks_receive_every_id_once() {
        let allocator = Arc::new(
            AsyncIdAllocator::new(Some(RANGE_ID_GENERATOR), MemoryStore::new(), 2, 10).unwrap(),
        );

        let tasks = (0..10).map(|_| {
            let allocator = Arc::clone(&allocator);
            tokio::spawn(async move {
                let mut ids = Vec::with_capacity(10);
                for _ in 0..10 {
                    ids.push(allocator.allocate().await.unwrap());
                }
                ids
            })
        });

        let mut ids: Vec<i64> = try_join_all(tasks)
            .await
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (2..=101).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn clears_negative_counter() {
        let store = Arc::new(MemoryStore::new());
        store.set(RANGE_ID_GENERATOR, -1024).unwrap();
        let allocator =
            AsyncIdAllocator::new(Some(RANGE_ID_GENERATOR), Arc::clone(&store), 2, 10).unwrap();

        assert_eq!(allocator.allocate().await.unwrap(), 2);
        assert_eq!(store.round_trips(), 7);
        assert_eq!(allocator.buffered().await, 244);
    }

    #[tokio::test]
    async fn recovers_after_key_fault() {
        let allocator =
            AsyncIdAllocator::new(Some(RANGE_ID_GENERATOR), MemoryStore::new(), 2, 10).unwrap();
        assert_eq!(allocator.allocate().await.unwrap(), 2);

        allocator.set_counter_key(None).await;
        for expected in 3..=10 {
            assert_eq!(allocator.allocate().await.unwrap(), expected);
        }
        for _ in 0..10 {
            let err = allocator.allocate().await.unwrap_err();
            assert!(matches!(err, Error::BackingStore(StoreError::MissingKey)));
        }

        allocator.set_counter_key(Some(RANGE_ID_GENERATOR)).await;
        assert_eq!(allocator.counter_key().await, Some(RANGE_ID_GENERATOR));
        let mut seen = HashSet::new();
        for expected in 11..50 {
            let id = allocator.allocate().await.unwrap();
            assert_eq!(id, expected);
            assert!(seen.insert(id));
        }
    }

    #[test]
    fn rejects_invalid_arguments() {
        for (min_id, block_size) in [(0, 10), (2, 0), (-5, 10), (2, -1)] {
            let err =
                AsyncIdAllocator::new(None, MemoryStore::new(), min_id, block_size).unwrap_err();
            assert!(matches!(err, Error::Configuration { .. }), "{err}");
        }

        let config = IdAllocatorConfig::default();
        assert!(AsyncIdAllocator::with_config(None, MemoryStore::new(), config).is_ok());
    }

    #[tokio::test]
    async fn invalid_key_fails_every_call() {
        let store = Arc::new(MemoryStore::new());
        let allocator =
            AsyncIdAllocator::new(Some(CounterKey::new("")), Arc::clone(&store), 2, 10).unwrap();
        for _ in 0..3 {
            let err = allocator.allocate().await.unwrap_err();
            assert!(matches!(
                err,
                Error::BackingStore(StoreError::InvalidKey { .. })
            ));
        }
        assert_eq!(store.round_trips(), 3);
        assert_eq!(allocator.buffered().await, 0);
    }

    #[tokio::test]
    async fn transient_store_failure_is_surfaced_then_retried() {
        let store = Arc::new(MemoryStore::new());
        let allocator =
            AsyncIdAllocator::new(Some(RANGE_ID_GENERATOR), Arc::clone(&store), 2, 10).unwrap();

        store.fail_next(1);
        let err = allocator.allocate().await.unwrap_err();
        assert!(matches!(
            err,
            Error::BackingStore(StoreError::Unavailable { .. })
        ));
        assert_eq!(store.get(&RANGE_ID_GENERATOR).unwrap(), None);

        assert_eq!(allocator.allocate().await.unwrap(), 2);
        assert_eq!(allocator.buffered().await, 8);
    }

    #[tokio::test]
    async fn doubling_past_i64_range_reports_overflow() {
        let store = Arc::new(MemoryStore::new());
        store.set(RANGE_ID_GENERATOR, i64::MIN).unwrap();
        let block_size = 1_i64 << 61;
        let allocator = AsyncIdAllocator::new(
            Some(RANGE_ID_GENERATOR),
            Arc::clone(&store),
            2,
            block_size,
        )
        .unwrap();

        let err = allocator.allocate().await.unwrap_err();
        assert!(matches!(err, Error::CounterOverflow { step } if step == 1 << 62));
        assert_eq!(store.get(&RANGE_ID_GENERATOR).unwrap(), Some(-(1_i64 << 61)));
        assert_eq!(allocator.buffered().await, 0);
    }
}
