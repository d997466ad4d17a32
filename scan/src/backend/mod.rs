//! Entry points of a whole run, dispatched on the configured backend.

pub mod message_passing;
pub mod shared_memory;

use std::sync::Arc;

use log::info;

use crate::{
    config::{Backend, RunConfig},
    context::RunContext,
    error::Result,
    provider::DataProvider,
    timing::IterationStats,
};

/// Result of a benchmarked scan.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// Corrected scan of each worker's partition, indexed by rank.
    pub scans: Vec<Vec<i64>>,
    /// Per iteration timings as seen by rank 0.
    pub stats: Vec<IterationStats>,
    /// Carry values handed between workers over the whole run.
    pub carries: usize,
}

impl ScanOutcome {
    /// The scan of the whole input, partitions joined in rank order.
    pub fn concatenated(&self) -> Vec<i64> {
        self.scans.concat()
    }
}

/// Result of a benchmarked reduction.
#[derive(Debug, Clone)]
pub struct ReduceOutcome {
    pub sum: i64,
    pub stats: Vec<IterationStats>,
}

/// Runs `config.iterations()` timed prefix sum trials over the input
/// produced by `provider`.
///
/// # Errors
/// The root cause of the first failure on any worker.
pub async fn run_scan(config: &RunConfig, provider: Arc<dyn DataProvider>) -> Result<ScanOutcome> {
    let ctx = RunContext::new(*config, provider)?;
    info!(
        elems = config.elems(),
        workers = config.workers(),
        backend = config.backend().tag();
        "starting prefix sum"
    );

    let outcome = match config.backend() {
        Backend::MessagePassing => message_passing::run_scan(&ctx).await?,
        Backend::SharedMemory => shared_memory::run_scan(ctx).await?,
    };

    info!(carries = outcome.carries; "prefix sum finished");
    Ok(outcome)
}

/// Runs `config.iterations()` timed sum trials over the input produced by
/// `provider`.
///
/// # Errors
/// The root cause of the first failure on any worker.
pub async fn run_reduce(
    config: &RunConfig,
    provider: Arc<dyn DataProvider>,
) -> Result<ReduceOutcome> {
    let ctx = RunContext::new(*config, provider)?;
    info!(
        elems = config.elems(),
        workers = config.workers(),
        backend = config.backend().tag();
        "starting sum"
    );

    let outcome = match config.backend() {
        Backend::MessagePassing => message_passing::run_reduce(&ctx).await?,
        Backend::SharedMemory => shared_memory::run_reduce(ctx).await?,
    };

    info!(sum = outcome.sum; "sum finished");
    Ok(outcome)
}
