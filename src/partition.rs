//! Static iteration partitioning.
//!
//! `N` iterations are split over `T` threads into contiguous, balanced
//! chunks in thread order: the first `N mod T` threads receive one extra
//! iteration. Each chunk is then cut into lane groups of width `L`, the last
//! group holding the remainder. Thread order equals iteration order, which is
//! what lets the cross-thread scan reproduce the sequential result.

use crate::error::{Result, ScanError};
use std::ops::Range;

/// Half-open iteration range owned by one thread for both passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkDescriptor {
    pub thread_id: usize,
    pub start: usize,
    pub end: usize,
}

impl ChunkDescriptor {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn contains(&self, iteration: usize) -> bool {
        self.range().contains(&iteration)
    }
}

/// Contiguous sub-range of a chunk processed as one vector unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaneGroup {
    pub start: usize,
    pub end: usize,
}

impl LaneGroup {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Splits `[0, iterations)` into `team_size` ordered, balanced chunks.
pub fn partition(iterations: usize, team_size: usize) -> Result<Vec<ChunkDescriptor>> {
    if team_size == 0 {
        return Err(ScanError::InvalidTeamSize(team_size));
    }
    Ok((0..team_size)
        .map(|thread_id| balanced_chunk(iterations, team_size, thread_id))
        .collect())
}

/// Splits a chunk into lane groups of width `lane_width`.
pub fn partition_lanes(chunk: &ChunkDescriptor, lane_width: usize) -> Result<Vec<LaneGroup>> {
    if lane_width == 0 {
        return Err(ScanError::InvalidLaneWidth(lane_width));
    }
    Ok(lane_groups(chunk.start, chunk.end, lane_width).collect())
}

fn balanced_chunk(iterations: usize, team_size: usize, thread_id: usize) -> ChunkDescriptor {
    let base = iterations / team_size;
    let extra = iterations % team_size;
    let (len, start) = if thread_id < extra {
        (base + 1, (base + 1) * thread_id)
    } else {
        (base, base * thread_id + extra)
    };
    ChunkDescriptor {
        thread_id,
        start,
        end: start + len,
    }
}

fn lane_groups(start: usize, end: usize, width: usize) -> impl Iterator<Item = LaneGroup> {
    (start..end).step_by(width).map(move |group_start| LaneGroup {
        start: group_start,
        end: (group_start + width).min(end),
    })
}

/// Validated `(T, L)` pair; hands out chunks and lane groups without
/// re-checking on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationPartitioner {
    team_size: usize,
    lane_width: usize,
}

impl IterationPartitioner {
    pub fn new(team_size: usize, lane_width: usize) -> Result<Self> {
        if team_size == 0 {
            return Err(ScanError::InvalidTeamSize(team_size));
        }
        if lane_width == 0 {
            return Err(ScanError::InvalidLaneWidth(lane_width));
        }
        Ok(Self {
            team_size,
            lane_width,
        })
    }

    pub fn team_size(&self) -> usize {
        self.team_size
    }

    pub fn lane_width(&self) -> usize {
        self.lane_width
    }

    pub fn chunks(&self, iterations: usize) -> Vec<ChunkDescriptor> {
        (0..self.team_size)
            .map(|t| balanced_chunk(iterations, self.team_size, t))
            .collect()
    }

    /// The chunk of a single thread, computed locally by that thread.
    pub fn chunk_for(&self, iterations: usize, thread_id: usize) -> Result<ChunkDescriptor> {
        if thread_id >= self.team_size {
            return Err(ScanError::ThreadOutOfRange {
                thread: thread_id,
                team_size: self.team_size,
            });
        }
        Ok(balanced_chunk(iterations, self.team_size, thread_id))
    }

    pub fn lanes(&self, chunk: &ChunkDescriptor) -> impl Iterator<Item = LaneGroup> {
        lane_groups(chunk.start, chunk.end, self.lane_width)
    }

    /// Thread owning the sequentially last iteration, if there is one.
    pub fn last_iteration_owner(&self, iterations: usize) -> Option<usize> {
        if iterations == 0 {
            return None;
        }
        // Only the trailing threads can be empty.
        Some(self.team_size.min(iterations) - 1)
    }
}
