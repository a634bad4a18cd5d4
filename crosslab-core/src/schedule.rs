//! Rebalance schedule over a simulated bar range.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Bars `[start, end)` of the panel grid, rebalanced every `every` bars
/// counting from `start`.
///
/// `history_start` is the earliest bar whose returns signals may read. It is
/// never after `start`; walk-forward test windows set it to their fold's
/// train start so the first test scores can use train-period history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub start: usize,
    pub end: usize,
    pub every: usize,
    pub history_start: usize,
}

impl Schedule {
    pub fn new(range: Range<usize>, every: usize, history_start: usize) -> Self {
        Self {
            start: range.start,
            end: range.end.max(range.start),
            every: every.max(1),
            history_start: history_start.min(range.start),
        }
    }

    /// Schedule whose history starts at its own first bar.
    pub fn isolated(range: Range<usize>, every: usize) -> Self {
        let start = range.start;
        Self::new(range, every, start)
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn is_rebalance(&self, t: usize) -> bool {
        t >= self.start && t < self.end && (t - self.start) % self.every == 0
    }

    pub fn rebalance_points(&self) -> impl Iterator<Item = usize> {
        (self.start..self.end).step_by(self.every)
    }
}
