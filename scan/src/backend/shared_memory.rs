//! Every worker is a thread of one rayon pool and they all share a single
//! buffer, each writing only to its own sub-slice.

use log::debug;
use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};
use tokio::task;

use super::{ReduceOutcome, ScanOutcome};
use crate::{
    context::RunContext,
    error::{Result, ScanErr},
    local::{self, try_alloc},
    partition::PartitionTable,
    timing::{TimingHarness, Trial},
};

/// Builds a pool with exactly one thread per worker.
fn build_pool(workers: usize) -> Result<ThreadPool> {
    ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("scan-worker-{i}"))
        .build()
        .map_err(|e| ScanErr::Worker(format!("failed to build the thread pool: {e}")))
}

/// Splits `buf` into consecutive sub-slices of the given lengths.
fn split_by_counts<'a, T>(mut buf: &'a mut [T], counts: &[usize]) -> Vec<&'a mut [T]> {
    counts
        .iter()
        .map(|&n| {
            let (head, tail) = std::mem::take(&mut buf).split_at_mut(n);
            buf = tail;
            head
        })
        .collect()
}

/// Exclusive running sum of the per slice totals: slice `i` is offset by
/// everything before it.
fn exclusive_offsets(totals: &[i64]) -> Vec<i64> {
    totals
        .iter()
        .scan(0i64, |acc, &t| {
            let carry = *acc;
            *acc += t;
            Some(carry)
        })
        .collect()
}

/// The root's total: the per worker sums folded in rank order.
fn fold_in_rank_order(partials: &[i64]) -> i64 {
    partials.iter().fold(0, |acc, &sum| acc + sum)
}

/// Allocates the whole input and fills it partition by partition.
fn load_input(ctx: &RunContext, pool: &ThreadPool) -> Result<Vec<i32>> {
    let table = ctx.table();
    let mut input = try_alloc::<i32>(0, table.elems())?;

    let provider = ctx.provider();
    let slices = split_by_counts(&mut input, &table.counts());
    pool.install(|| {
        slices
            .into_par_iter()
            .zip(table.partitions())
            .for_each(|(out, part)| provider.fill(part.range(), out));
    });

    Ok(input)
}

struct SharedScanTrial<'a> {
    pool: &'a ThreadPool,
    table: &'a PartitionTable,
    input: &'a [i32],
    buffer: Vec<i64>,
    carries: usize,
}

impl Trial for SharedScanTrial<'_> {
    async fn reset(&mut self) -> Result<()> {
        local::load(self.input, &mut self.buffer);
        Ok(())
    }

    async fn barrier(&mut self) -> Result<()> {
        self.pool.broadcast(|_| ());
        Ok(())
    }

    async fn compute(&mut self) -> Result<()> {
        let counts = self.table.counts();
        let mut slices = split_by_counts(&mut self.buffer, &counts);

        // Every total must be known before any carry is applied, the collect
        // inside `install` is that join.
        let totals: Vec<i64> = self.pool.install(|| {
            slices
                .par_iter_mut()
                .map(|slice| local::local_scan(slice))
                .collect()
        });

        let offsets = exclusive_offsets(&totals);
        self.pool.install(|| {
            slices
                .into_par_iter()
                .zip(offsets)
                .for_each(|(slice, carry)| local::apply_carry(slice, carry));
        });

        self.carries += totals.len() - 1;
        Ok(())
    }
}

struct SharedReduceTrial<'a> {
    pool: &'a ThreadPool,
    table: &'a PartitionTable,
    input: &'a [i32],
    sum: i64,
}

impl Trial for SharedReduceTrial<'_> {
    async fn reset(&mut self) -> Result<()> {
        self.sum = 0;
        Ok(())
    }

    async fn barrier(&mut self) -> Result<()> {
        self.pool.broadcast(|_| ());
        Ok(())
    }

    async fn compute(&mut self) -> Result<()> {
        let input = self.input;
        let partials: Vec<i64> = self.pool.install(|| {
            self.table
                .partitions()
                .par_iter()
                .map(|part| local::local_sum(&input[part.range()]))
                .collect()
        });
        self.sum = fold_in_rank_order(&partials);

        Ok(())
    }
}

fn scan_blocking(ctx: RunContext) -> Result<ScanOutcome> {
    let table = ctx.table();
    let pool = build_pool(table.workers())?;
    let input = load_input(&ctx, &pool)?;
    let buffer = try_alloc::<i64>(0, table.elems())?;

    let mut trial = SharedScanTrial {
        pool: &pool,
        table,
        input: &input,
        buffer,
        carries: 0,
    };

    let mut harness = TimingHarness::new();
    futures::executor::block_on(harness.run_trials(&mut trial, ctx.config().iterations()))?;
    debug!(threads = pool.current_num_threads(); "shared memory prefix sum done");

    let SharedScanTrial {
        mut buffer,
        carries,
        ..
    } = trial;

    let scans = split_by_counts(&mut buffer, &table.counts())
        .into_iter()
        .map(|slice| slice.to_vec())
        .collect();

    Ok(ScanOutcome {
        scans,
        stats: harness.into_stats(),
        carries,
    })
}

fn reduce_blocking(ctx: RunContext) -> Result<ReduceOutcome> {
    let table = ctx.table();
    let pool = build_pool(table.workers())?;
    let input = load_input(&ctx, &pool)?;

    let mut trial = SharedReduceTrial {
        pool: &pool,
        table,
        input: &input,
        sum: 0,
    };

    let mut harness = TimingHarness::new();
    futures::executor::block_on(harness.run_trials(&mut trial, ctx.config().iterations()))?;

    Ok(ReduceOutcome {
        sum: trial.sum,
        stats: harness.into_stats(),
    })
}

/// Runs a prefix sum on a dedicated thread pool, off the async runtime.
pub async fn run_scan(ctx: RunContext) -> Result<ScanOutcome> {
    task::spawn_blocking(move || scan_blocking(ctx))
        .await
        .map_err(|e| ScanErr::Worker(format!("shared memory scan failed: {e}")))?
}

/// Runs a sum on a dedicated thread pool, off the async runtime.
pub async fn run_reduce(ctx: RunContext) -> Result<ReduceOutcome> {
    task::spawn_blocking(move || reduce_blocking(ctx))
        .await
        .map_err(|e| ScanErr::Worker(format!("shared memory sum failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_follow_counts() {
        let mut buf = [1, 2, 3, 4, 5];
        let slices = split_by_counts(&mut buf, &[2, 0, 3]);

        assert_eq!(slices.len(), 3);
        assert_eq!(&*slices[0], [1, 2]);
        assert!(slices[1].is_empty());
        assert_eq!(&*slices[2], [3, 4, 5]);
    }

    #[test]
    fn offsets_are_exclusive() {
        assert_eq!(exclusive_offsets(&[4, 3, 3]), [0, 4, 7]);
        assert_eq!(exclusive_offsets(&[]), Vec::<i64>::new());
    }

    #[test]
    fn partial_sums_fold_to_the_total() {
        assert_eq!(fold_in_rank_order(&[4, 0, -3, 9]), 10);
        assert_eq!(fold_in_rank_order(&[]), 0);
    }
}
