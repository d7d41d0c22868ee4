use crate::{Error, Result};

/// FIFO of fetched-but-undispensed IDs.
///
/// Every replenishment yields one contiguous ascending range, and the buffer
/// is only refilled once empty, so the queue is always a single run of
/// integers and is stored as `next` plus a count. A doubled block (see
/// [`Replenish`]) can hold more than `block_size` values without growing any
/// allocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Block {
    next: i64,
    remaining: u64,
}

impl Block {
    pub(crate) fn len(&self) -> u64 {
        self.remaining
    }

    pub(crate) fn pop(&mut self) -> Option<i64> {
        if self.remaining == 0 {
            return None;
        }
        let id = self.next;
        self.remaining -= 1;
        if self.remaining > 0 {
            self.next += 1;
        }
        Some(id)
    }

    /// Loads the inclusive range `[first, last]` and dequeues `first`.
    ///
    /// The buffer must be empty and `first <= last`.
    pub(crate) fn refill_and_pop(&mut self, first: i64, last: i64) -> i64 {
        debug_assert_eq!(self.remaining, 0);
        debug_assert!(first <= last);
        self.next = first;
        self.remaining = last.abs_diff(first) + 1;
        // `first` is returned straight away.
        self.remaining -= 1;
        if self.remaining > 0 {
            self.next += 1;
        }
        first
    }
}

/// One replenishment attempt's climb toward `min_id`.
///
/// The caller increments the counter by [`Replenish::step`] and feeds the
/// resulting value to [`Replenish::observe`]. While the counter is still
/// below `min_id` the step doubles, so a counter that starts far below the
/// bound is cleared in logarithmically many round trips.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Replenish {
    min_id: i64,
    step: i64,
}

impl Replenish {
    pub(crate) fn new(min_id: i64, block_size: i64) -> Self {
        debug_assert!(min_id > 0 && block_size > 0);
        Self {
            min_id,
            step: block_size,
        }
    }

    pub(crate) fn step(&self) -> i64 {
        self.step
    }

    /// Returns the usable inclusive range once `new_value` reaches `min_id`,
    /// otherwise doubles the step and returns `None`.
    ///
    /// Values of the block below `min_id` are dropped for good.
    ///
    /// # Errors
    /// [`Error::CounterOverflow`] if the step cannot be doubled.
    pub(crate) fn observe(&mut self, new_value: i64) -> Result<Option<(i64, i64)>> {
        if new_value >= self.min_id {
            // new_value > 0 and step > 0, so this cannot underflow.
            let first = (new_value - self.step + 1).max(self.min_id);
            return Ok(Some((first, new_value)));
        }
        self.step = self
            .step
            .checked_mul(2)
            .ok_or(Error::CounterOverflow { step: self.step })?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_dispenses_in_ascending_order() {
        let mut block = Block::default();
        assert_eq!(block.pop(), None);

        assert_eq!(block.refill_and_pop(2, 5), 2);
        assert_eq!(block.len(), 3);
        assert_eq!(block.pop(), Some(3));
        assert_eq!(block.pop(), Some(4));
        assert_eq!(block.pop(), Some(5));
        assert_eq!(block.pop(), None);
        assert_eq!(block.len(), 0);
    }

    #[test]
    fn block_handles_the_top_of_the_range() {
        let mut block = Block::default();
        assert_eq!(block.refill_and_pop(i64::MAX - 1, i64::MAX), i64::MAX - 1);
        assert_eq!(block.pop(), Some(i64::MAX));
        assert_eq!(block.pop(), None);

        assert_eq!(block.refill_and_pop(i64::MAX, i64::MAX), i64::MAX);
        assert_eq!(block.pop(), None);
    }

    #[test]
    fn replenish_clips_first_block_to_min_id() {
        let mut round = Replenish::new(2, 10);
        assert_eq!(round.observe(10).unwrap(), Some((2, 10)));
        assert_eq!(round.observe(20).unwrap(), Some((11, 20)));
    }

    #[test]
    fn replenish_doubles_until_min_id_is_cleared() {
        let mut round = Replenish::new(2, 10);
        let mut counter = -1024_i64;
        let mut steps = Vec::new();
        let range = loop {
            steps.push(round.step());
            counter += round.step();
            if let Some(range) = round.observe(counter).unwrap() {
                break range;
            }
        };
        assert_eq!(steps, [10, 20, 40, 80, 160, 320, 640]);
        assert_eq!(range, (2, 246));
    }

    #[test]
    fn replenish_reports_step_overflow() {
        let mut round = Replenish::new(1, i64::MAX / 2 + 1);
        let err = round.observe(-5).unwrap_err();
        assert!(matches!(err, Error::CounterOverflow { step } if step == i64::MAX / 2 + 1));
    }
}
