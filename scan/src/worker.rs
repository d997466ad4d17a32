use log::debug;

use crate::{
    error::Result,
    local::{self, try_alloc},
    partition::WorkerPartition,
    provider::DataProvider,
};

/// The data a single message-passing rank owns: its slice of the canonical
/// input and the buffer the scan runs in.
#[derive(Debug, Clone)]
pub struct WorkerState {
    partition: WorkerPartition,
    input: Vec<i32>,
    buffer: Vec<i64>,
}

impl WorkerState {
    /// Allocates both buffers for `partition` and fills the input from
    /// `provider`.
    ///
    /// # Errors
    /// `ScanErr::Alloc` if either buffer cannot be reserved.
    pub fn allocate(partition: WorkerPartition, provider: &dyn DataProvider) -> Result<Self> {
        let mut input = try_alloc::<i32>(partition.rank, partition.count)?;
        let buffer = try_alloc::<i64>(partition.rank, partition.count)?;

        provider.fill(partition.range(), &mut input);
        debug!(
            rank = partition.rank,
            start = partition.start,
            count = partition.count;
            "worker allocated"
        );

        let mut state = Self {
            partition,
            input,
            buffer,
        };
        state.reload();

        Ok(state)
    }

    pub fn partition(&self) -> &WorkerPartition {
        &self.partition
    }

    pub fn input(&self) -> &[i32] {
        &self.input
    }

    pub fn buffer(&self) -> &[i64] {
        &self.buffer
    }

    pub fn into_buffer(self) -> Vec<i64> {
        self.buffer
    }

    /// Restores the buffer from the input, undoing any previous trial.
    pub fn reload(&mut self) {
        local::load(&self.input, &mut self.buffer);
    }

    pub fn local_scan(&mut self) -> i64 {
        local::local_scan(&mut self.buffer)
    }

    pub fn apply_carry(&mut self, carry: i64) {
        local::apply_carry(&mut self.buffer, carry);
    }

    pub fn local_sum(&self) -> i64 {
        local::local_sum(&self.input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{partition::partition, provider::from_fn};

    #[test]
    fn owns_its_slice_only() {
        let provider = from_fn(|i| i as i32 + 1);
        let part = partition(10, 3, 1).unwrap();
        let mut state = WorkerState::allocate(part, &provider).unwrap();

        assert_eq!(state.input(), [5, 6, 7]);
        assert_eq!(state.local_sum(), 18);
        assert_eq!(state.local_scan(), 18);

        state.apply_carry(10);
        assert_eq!(state.buffer(), [15, 21, 28]);

        state.reload();
        assert_eq!(state.buffer(), [5, 6, 7]);
    }

    #[test]
    fn empty_partition() {
        let part = partition(3, 5, 4).unwrap();
        let mut state = WorkerState::allocate(part, &from_fn(|_| 1)).unwrap();

        assert_eq!(state.local_scan(), 0);
        assert_eq!(state.local_sum(), 0);
        assert!(state.into_buffer().is_empty());
    }
}
