//! Contiguous, near-even split of `N` elements over `W` workers.
//!
//! Every worker derives its own bounds from `(N, W, rank)` alone, so no
//! communication is needed to agree on ownership.

use std::{num::NonZeroUsize, ops::Range};

use serde::Serialize;

use crate::error::{Result, ScanErr};

/// The index range a single worker owns for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerPartition {
    pub rank: usize,
    pub start: usize,
    pub end: usize,
    pub count: usize,
}

impl WorkerPartition {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Computes the partition owned by `rank`.
///
/// The first `elems % workers` ranks own one extra element. When there are
/// more workers than elements the trailing ranks own nothing.
///
/// # Errors
/// `ScanErr::Config` if `workers` is zero or `rank` is not below `workers`.
pub fn partition(elems: usize, workers: usize, rank: usize) -> Result<WorkerPartition> {
    let Some(workers) = NonZeroUsize::new(workers) else {
        return Err(ScanErr::config("the number of workers must be at least 1"));
    };

    if rank >= workers.get() {
        return Err(ScanErr::config(format!(
            "rank {rank} is outside [0, {workers})"
        )));
    }

    let mean = elems / workers;
    let remainder = elems % workers;

    let (start, count) = if rank < remainder {
        (rank * (mean + 1), mean + 1)
    } else {
        (rank * mean + remainder, mean)
    };

    Ok(WorkerPartition {
        rank,
        start,
        end: start + count,
        count,
    })
}

/// All the partitions of one run, indexed by rank. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionTable {
    elems: usize,
    parts: Vec<WorkerPartition>,
}

impl PartitionTable {
    /// Builds the table for `elems` elements over `workers` workers.
    pub fn new(elems: usize, workers: usize) -> Result<Self> {
        let parts = (0..workers)
            .map(|rank| partition(elems, workers, rank))
            .collect::<Result<Vec<_>>>()?;

        if parts.is_empty() {
            return Err(ScanErr::config("the number of workers must be at least 1"));
        }

        Ok(Self { elems, parts })
    }

    pub fn elems(&self) -> usize {
        self.elems
    }

    pub fn workers(&self) -> usize {
        self.parts.len()
    }

    pub fn get(&self, rank: usize) -> Option<&WorkerPartition> {
        self.parts.get(rank)
    }

    pub fn partitions(&self) -> &[WorkerPartition] {
        &self.parts
    }

    pub fn counts(&self) -> Vec<usize> {
        self.parts.iter().map(|p| p.count).collect()
    }
}
