//! Cross-thread scan of the per-thread totals.
//!
//! Shared state is one write-once cell per thread for the local total and
//! one for the offset, plus the grand total. Totals are written by their
//! owner before barrier 1; offsets and the grand total are written between
//! barrier 1 and barrier 2; nothing is read before its producing barrier.

use crate::config::CrossScanStrategy;
use crate::error::{Result, ScanError};
use crate::operator::Combiner;
use std::sync::OnceLock;

#[derive(Debug)]
pub struct SharedScanState<T> {
    totals: Vec<OnceLock<T>>,
    offsets: Vec<OnceLock<T>>,
    grand_total: OnceLock<T>,
}

impl<T: Copy> SharedScanState<T> {
    /// Sized once for the whole team.
    pub fn new(team_size: usize) -> Self {
        Self {
            totals: (0..team_size).map(|_| OnceLock::new()).collect(),
            offsets: (0..team_size).map(|_| OnceLock::new()).collect(),
            grand_total: OnceLock::new(),
        }
    }

    pub fn team_size(&self) -> usize {
        self.totals.len()
    }

    pub fn publish_total(&self, thread: usize, total: T) -> Result<()> {
        Self::publish(&self.totals, thread, total)
    }

    pub fn total(&self, thread: usize) -> Result<T> {
        self.totals
            .get(thread)
            .and_then(|cell| cell.get().copied())
            .ok_or(ScanError::MissingThreadTotal { thread })
    }

    pub fn offset(&self, thread: usize) -> Result<T> {
        self.offsets
            .get(thread)
            .and_then(|cell| cell.get().copied())
            .ok_or(ScanError::MissingOffset { thread })
    }

    pub fn grand_total(&self) -> Option<T> {
        self.grand_total.get().copied()
    }

    fn publish(cells: &[OnceLock<T>], thread: usize, value: T) -> Result<()> {
        let cell = cells.get(thread).ok_or(ScanError::ThreadOutOfRange {
            thread,
            team_size: cells.len(),
        })?;
        cell.set(value)
            .map_err(|_| ScanError::SlotAlreadyPublished { thread })
    }
}

pub struct CrossThreadScanner<'a, T> {
    combiner: &'a Combiner<T>,
    strategy: CrossScanStrategy,
}

impl<'a, T: Copy> CrossThreadScanner<'a, T> {
    pub fn new(combiner: &'a Combiner<T>, strategy: CrossScanStrategy) -> Self {
        Self { combiner, strategy }
    }

    /// Runs between the two barriers on every thread of the team.
    pub fn scan(&self, shared: &SharedScanState<T>, thread_id: usize) -> Result<()> {
        match self.strategy {
            CrossScanStrategy::Designated => {
                if thread_id != 0 {
                    return Ok(());
                }
                let totals = (0..shared.team_size())
                    .map(|t| shared.total(t))
                    .collect::<Result<Vec<T>>>()?;
                let (offsets, grand_total) = exclusive_offsets(self.combiner, &totals);
                for (t, offset) in offsets.into_iter().enumerate() {
                    SharedScanState::publish(&shared.offsets, t, offset)?;
                }
                Self::publish_grand_total(shared, grand_total)
            }
            CrossScanStrategy::Redundant => {
                let offset = self.prefix(shared, thread_id)?;
                SharedScanState::publish(&shared.offsets, thread_id, offset)?;
                if thread_id == 0 {
                    let grand_total = self.prefix(shared, shared.team_size())?;
                    Self::publish_grand_total(shared, grand_total)?;
                }
                Ok(())
            }
        }
    }

    /// Combination of the totals of threads `0..upto`.
    fn prefix(&self, shared: &SharedScanState<T>, upto: usize) -> Result<T> {
        (0..upto).try_fold(self.combiner.identity(), |acc, t| {
            Ok(self.combiner.combine(acc, shared.total(t)?))
        })
    }

    fn publish_grand_total(shared: &SharedScanState<T>, value: T) -> Result<()> {
        shared
            .grand_total
            .set(value)
            .map_err(|_| ScanError::SlotAlreadyPublished { thread: 0 })
    }
}

/// Exclusive prefix of `totals` and their combination, computed in one pass.
pub fn exclusive_offsets<T: Copy>(combiner: &Combiner<T>, totals: &[T]) -> (Vec<T>, T) {
    let mut running = combiner.identity();
    let offsets = totals
        .iter()
        .map(|&total| {
            let offset = running;
            running = combiner.combine(running, total);
            offset
        })
        .collect();
    (offsets, running)
}
