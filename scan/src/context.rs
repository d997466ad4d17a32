use std::sync::Arc;

use crate::{
    config::RunConfig,
    error::{Result, ScanErr},
    partition::PartitionTable,
    provider::DataProvider,
    worker::WorkerState,
};

/// Everything one run shares between its workers. Owned by whoever starts
/// the run and immutable once built.
#[derive(Clone)]
pub struct RunContext {
    config: RunConfig,
    table: PartitionTable,
    provider: Arc<dyn DataProvider>,
}

impl RunContext {
    /// Creates a new `RunContext`.
    ///
    /// # Errors
    /// `ScanErr::Config` if the partition table cannot be built.
    pub fn new(config: RunConfig, provider: Arc<dyn DataProvider>) -> Result<Self> {
        let table = PartitionTable::new(config.elems(), config.workers())?;

        Ok(Self {
            config,
            table,
            provider,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn table(&self) -> &PartitionTable {
        &self.table
    }

    pub fn provider(&self) -> &dyn DataProvider {
        &*self.provider
    }

    /// Allocates and loads the state of worker `rank`.
    ///
    /// # Errors
    /// `ScanErr::Config` for an unknown rank, `ScanErr::Alloc` if its
    /// buffers cannot be reserved.
    pub fn worker(&self, rank: usize) -> Result<WorkerState> {
        let partition = self.table.get(rank).copied().ok_or_else(|| {
            ScanErr::config(format!(
                "rank {rank} is outside [0, {})",
                self.table.workers()
            ))
        })?;

        WorkerState::allocate(partition, self.provider())
    }
}
