use crate::channels::SENTINEL;
use std::collections::VecDeque;

/// Fixed-capacity FIFO of readings, oldest first.
#[derive(Debug, Clone)]
pub(in crate::rollup) struct RollingWindow {
    capacity: usize,
    buffer: VecDeque<i64>,
}

impl RollingWindow {
    pub(in crate::rollup) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            buffer: VecDeque::with_capacity(capacity),
        }
    }

    pub(in crate::rollup) fn push(&mut self, value: i64) {
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(value);
    }

    pub(in crate::rollup) fn last(&self) -> Option<i64> {
        self.buffer.back().copied()
    }

    pub(in crate::rollup) fn to_vec(&self) -> Vec<i64> {
        self.buffer.iter().copied().collect()
    }

    pub(in crate::rollup) fn average(&self) -> i64 {
        average(self.buffer.iter().copied())
    }
}

/// Floor average over the non-negative values; the sentinel when there are none.
pub(crate) fn average<I>(values: I) -> i64
where
    I: IntoIterator<Item = i64>,
{
    let mut total = 0i64;
    let mut count = 0i64;
    for value in values.into_iter().filter(|v| *v >= 0) {
        total = total.saturating_add(value);
        count += 1;
    }
    if count == 0 {
        return SENTINEL;
    }
    total.div_euclid(count)
}
