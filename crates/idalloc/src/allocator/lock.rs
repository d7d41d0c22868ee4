#[cfg(feature = "tracing")]
use tracing::instrument;

use super::block::{Block, Replenish};
use crate::{
    CounterKey, CounterStore, IdAllocatorConfig, Result, StoreError,
    mutex::{Mutex, MutexGuard},
};
#[cfg(not(feature = "parking-lot"))]
use crate::mutex::PoisonError;

/// Everything the single-flight guard protects.
#[derive(Debug)]
struct State {
    key: Option<CounterKey>,
    buffer: Block,
}

/// A lock-based allocator that serves integer IDs from a locally buffered
/// block and refills the block from a [`CounterStore`] on demand.
///
/// The buffer and the counter key sit behind one mutex. A caller that finds
/// the buffer empty keeps holding the mutex while it talks to the store, so
/// at most one replenishment is in flight and every other caller waits for
/// its result instead of issuing a second increment.
///
/// ## Guarantees
/// - Every ID is `>= min_id`.
/// - No ID is returned twice for a given counter's persisted sequence, even
///   across processes sharing the counter.
/// - IDs from one block are dispensed in ascending order. Across blocks and
///   across threads no ordering is promised.
///
/// ## Failure
/// A failed replenishment enqueues nothing and is surfaced to the caller. IDs
/// already buffered keep being served, so a store outage only becomes visible
/// once the buffer drains. Repointing the counter key with
/// [`IdAllocator::set_counter_key`] recovers without rebuilding the
/// allocator.
///
/// # Example
/// ```
/// use idalloc::{IdAllocator, MemoryStore, RANGE_ID_GENERATOR};
///
/// let allocator =
///     IdAllocator::new(Some(RANGE_ID_GENERATOR), MemoryStore::new(), 2, 10).unwrap();
/// assert_eq!(allocator.allocate().unwrap(), 2);
/// assert_eq!(allocator.allocate().unwrap(), 3);
/// ```
pub struct IdAllocator<S>
where
    S: CounterStore,
{
    #[cfg(feature = "cache-padded")]
    state: crossbeam_utils::CachePadded<Mutex<State>>,
    #[cfg(not(feature = "cache-padded"))]
    state: Mutex<State>,
    store: S,
    min_id: i64,
    block_size: i64,
}

impl<S> IdAllocator<S>
where
    S: CounterStore,
{
    /// Creates an allocator drawing from the counter named by `counter_key`.
    ///
    /// No store call is made here: the first block is fetched lazily by the
    /// first [`IdAllocator::allocate`]. A missing or invalid key is accepted
    /// and only reported once a replenishment needs it.
    ///
    /// # Errors
    /// [`Error::Configuration`] if `min_id <= 0` or `block_size < 1`.
    ///
    /// [`Error::Configuration`]: crate::Error::Configuration
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

    /// Like [`IdAllocator::new`], taking the bounds from a config value.
    ///
    /// # Errors
    /// See [`IdAllocatorConfig::validate`].
    pub fn with_config(
        counter_key: Option<CounterKey>,
        store: S,
        config: IdAllocatorConfig,
    ) -> Result<Self> {
        config.validate()?;
        let state = Mutex::new(State {
            key: counter_key,
            buffer: Block::default(),
        });
        Ok(Self {
            #[cfg(feature = "cache-padded")]
            state: crossbeam_utils::CachePadded::new(state),
            #[cfg(not(feature = "cache-padded"))]
            state,
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
    pub fn counter_key(&self) -> Option<CounterKey> {
        self.lock().key.clone()
    }

    /// Repoints the allocator at another counter, or at none.
    ///
    /// Buffered IDs are kept and still dispensed first. Waits for an in-flight
    /// replenishment to finish.
    pub fn set_counter_key(&self, counter_key: Option<CounterKey>) {
        self.lock().key = counter_key;
    }

    /// Number of IDs fetched but not yet dispensed.
    pub fn buffered(&self) -> u64 {
        self.lock().buffer.len()
    }

    /// Returns the next ID.
    ///
    /// Served from the buffer when it holds anything. Otherwise the calling
    /// thread replenishes the buffer from the store, which may take several
    /// round trips if the counter is still below `min_id`, and returns the
    /// first value of the new block.
    ///
    /// # Errors
    /// - [`Error::BackingStore`] if the store fails or the counter key is
    ///   missing or invalid. Nothing is buffered and the call may be retried.
    /// - [`Error::CounterOverflow`] if the counter cannot clear `min_id`
    ///   without overflowing.
    ///
    /// A store call that panics propagates the panic to this caller only. The
    /// buffer and key are never written before a replenishment succeeds, so
    /// later calls keep working.
    ///
    /// [`Error::BackingStore`]: crate::Error::BackingStore
    /// [`Error::CounterOverflow`]: crate::Error::CounterOverflow
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn allocate(&self) -> Result<i64> {
        let mut state = self.lock();
        if let Some(id) = state.buffer.pop() {
            return Ok(id);
        }
        let (first, last) = self.replenish(state.key.as_ref())?;
        Ok(state.buffer.refill_and_pop(first, last))
    }

    /// Runs one replenishment. Only called with the state lock held.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    fn replenish(&self, key: Option<&CounterKey>) -> Result<(i64, i64)> {
        let key = key.ok_or(StoreError::MissingKey)?;
        let mut round = Replenish::new(self.min_id, self.block_size);
        loop {
            let step = round.step();
            let new_value = match self.store.increment(key, step) {
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

    // A poisoned guard is taken over as is: `State` is only written after a
    // replenishment has fully succeeded, so a panic cannot leave it torn.
    fn lock(&self) -> MutexGuard<'_, State> {
        #[cfg(feature = "parking-lot")]
        {
            self.state.lock()
        }
        #[cfg(not(feature = "parking-lot"))]
        {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }
}

impl<S> core::fmt::Debug for IdAllocator<S>
where
    S: CounterStore,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IdAllocator")
            .field("min_id", &self.min_id)
            .field("block_size", &self.block_size)
            .finish_non_exhaustive()
    }
}
