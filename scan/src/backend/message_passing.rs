//! Every rank is an independent task that only talks to its chain
//! neighbours.

use std::num::NonZeroUsize;

use log::{debug, info};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    task::JoinSet,
};

use super::{ReduceOutcome, ScanOutcome};
use crate::{
    chain::{ChainRank, duplex_chain},
    context::RunContext,
    error::{Result, ScanErr},
    timing::{IterationStats, TimingHarness, Trial},
    worker::WorkerState,
};

/// One rank's view of a prefix sum trial.
pub struct ScanTrial<'a, R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    chain: &'a mut ChainRank<R, W>,
    state: &'a mut WorkerState,
}

impl<R, W> Trial for ScanTrial<'_, R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn reset(&mut self) -> Result<()> {
        self.state.reload();
        Ok(())
    }

    async fn barrier(&mut self) -> Result<()> {
        self.chain.barrier().await
    }

    async fn compute(&mut self) -> Result<()> {
        let total = self.state.local_scan();
        let carry = self.chain.propagate_carry(total).await?;
        self.state.apply_carry(carry);
        Ok(())
    }
}

/// One rank's view of a sum trial.
pub struct ReduceTrial<'a, R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    chain: &'a mut ChainRank<R, W>,
    state: &'a WorkerState,
    sum: Option<i64>,
}

impl<R, W> Trial for ReduceTrial<'_, R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn reset(&mut self) -> Result<()> {
        self.sum = None;
        Ok(())
    }

    async fn barrier(&mut self) -> Result<()> {
        self.chain.barrier().await
    }

    async fn compute(&mut self) -> Result<()> {
        let local = self.state.local_sum();
        self.sum = self.chain.combine_sum(local).await?;
        Ok(())
    }
}

/// Runs every prefix sum trial of one rank.
///
/// On failure both neighbours are told before the error is returned, so
/// the whole chain winds down instead of waiting forever.
///
/// # Returns
/// This rank's per iteration timings. `state` holds its corrected scan.
pub async fn scan_rank<R, W>(
    chain: &mut ChainRank<R, W>,
    state: &mut WorkerState,
    iterations: NonZeroUsize,
) -> Result<Vec<IterationStats>>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let mut harness = TimingHarness::new();
    let mut trial = ScanTrial { chain, state };

    let outcome = harness
        .run_trials(&mut trial, iterations)
        .await
        .map(|_| ());

    if let Err(e) = outcome {
        debug!(rank = trial.chain.rank(); "prefix sum failed: {e}");
        trial.chain.notify_failure(&e).await;
        return Err(e);
    }

    Ok(harness.into_stats())
}

/// Runs every sum trial of one rank.
///
/// # Returns
/// The total on the root, `None` elsewhere, and this rank's timings.
pub async fn reduce_rank<R, W>(
    chain: &mut ChainRank<R, W>,
    state: &WorkerState,
    iterations: NonZeroUsize,
) -> Result<(Option<i64>, Vec<IterationStats>)>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let mut harness = TimingHarness::new();
    let mut trial = ReduceTrial {
        chain,
        state,
        sum: None,
    };

    let outcome = harness
        .run_trials(&mut trial, iterations)
        .await
        .map(|_| ());

    if let Err(e) = outcome {
        debug!(rank = trial.chain.rank(); "sum failed: {e}");
        trial.chain.notify_failure(&e).await;
        return Err(e);
    }

    Ok((trial.sum, harness.into_stats()))
}

struct RankScan {
    rank: usize,
    scan: Vec<i64>,
    stats: Vec<IterationStats>,
    carries: usize,
}

/// Runs a prefix sum with every rank as a task of the current runtime,
/// linked by in-memory streams.
pub async fn run_scan(ctx: &RunContext) -> Result<ScanOutcome> {
    let workers = ctx.config().workers();
    let iterations = ctx.config().iterations();

    let states = (0..workers)
        .map(|rank| ctx.worker(rank))
        .collect::<Result<Vec<_>>>()?;

    let mut tasks = JoinSet::new();
    for (mut chain, mut state) in duplex_chain(workers)?.into_iter().zip(states) {
        tasks.spawn(async move {
            let stats = scan_rank(&mut chain, &mut state, iterations).await?;

            Ok(RankScan {
                rank: chain.rank(),
                scan: state.into_buffer(),
                stats,
                carries: chain.carries_sent(),
            })
        });
    }

    let mut ranks = join_ranks(tasks).await?;
    ranks.sort_by_key(|r| r.rank);

    let carries = ranks.iter().map(|r| r.carries).sum();
    let mut ranks = ranks.into_iter();
    let root = ranks
        .next()
        .ok_or_else(|| ScanErr::Worker("no rank finished".to_string()))?;

    let mut scans = vec![root.scan];
    scans.extend(ranks.map(|r| r.scan));

    Ok(ScanOutcome {
        scans,
        stats: root.stats,
        carries,
    })
}

/// Runs a sum with every rank as a task of the current runtime.
pub async fn run_reduce(ctx: &RunContext) -> Result<ReduceOutcome> {
    let workers = ctx.config().workers();
    let iterations = ctx.config().iterations();

    let states = (0..workers)
        .map(|rank| ctx.worker(rank))
        .collect::<Result<Vec<_>>>()?;

    let mut tasks = JoinSet::new();
    for (mut chain, state) in duplex_chain(workers)?.into_iter().zip(states) {
        tasks.spawn(async move { reduce_rank(&mut chain, &state, iterations).await });
    }

    let results = join_ranks(tasks).await?;

    // Only the root gets a total.
    let (sum, stats) = results
        .into_iter()
        .find_map(|(sum, stats)| sum.map(|sum| (sum, stats)))
        .ok_or_else(|| ScanErr::Worker("the root finished without a total".to_string()))?;

    Ok(ReduceOutcome { sum, stats })
}

/// Waits for every rank and picks the error that caused the others, if
/// any rank failed.
async fn join_ranks<T: 'static>(mut tasks: JoinSet<Result<T>>) -> Result<Vec<T>> {
    let mut done = Vec::with_capacity(tasks.len());
    let mut errors = Vec::new();

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(value)) => done.push(value),
            Ok(Err(e)) => errors.push(e),
            Err(e) => errors.push(ScanErr::Worker(format!("rank task failed: {e}"))),
        }
    }

    if errors.is_empty() {
        return Ok(done);
    }

    info!(failed = errors.len(); "run aborted");
    let cause = errors.iter().position(|e| !e.is_cascade()).unwrap_or(0);
    Err(errors.swap_remove(cause))
}
