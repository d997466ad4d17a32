use std::{num::NonZeroUsize, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanErr};

/// How workers are run and how they talk to each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Independent tasks or processes exchanging messages along the chain.
    #[default]
    MessagePassing,
    /// Threads sharing one buffer, each writing its own sub-range.
    SharedMemory,
}

impl Backend {
    /// The tag used in stats file names.
    pub fn tag(self) -> &'static str {
        match self {
            Self::MessagePassing => "mpi",
            Self::SharedMemory => "omp",
        }
    }

    /// Who ran the computation, as named in the stats file banner.
    pub fn runner(self) -> &'static str {
        match self {
            Self::MessagePassing => "MPI Parallel",
            Self::SharedMemory => "OpenMP Parallel",
        }
    }

    /// What a worker is called in stats file names.
    pub fn unit(self) -> &'static str {
        match self {
            Self::MessagePassing => "procs",
            Self::SharedMemory => "threads",
        }
    }
}

impl FromStr for Backend {
    type Err = ScanErr;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "message_passing" | "mpi" => Ok(Self::MessagePassing),
            "shared_memory" | "omp" => Ok(Self::SharedMemory),
            other => Err(ScanErr::config(format!("unknown backend {other:?}"))),
        }
    }
}

/// Which computation a run benchmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Workload {
    Scan,
    Sum,
}

impl Workload {
    /// The name used in the average line of the stats report.
    pub fn label(self) -> &'static str {
        match self {
            Self::Scan => "Prefix Sum",
            Self::Sum => "Sum",
        }
    }

    /// The prefix of stats file names.
    pub fn file_prefix(self) -> &'static str {
        match self {
            Self::Scan => "prefixsum",
            Self::Sum => "sum",
        }
    }
}

impl FromStr for Workload {
    type Err = ScanErr;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scan" | "prefixsum" => Ok(Self::Scan),
            "sum" | "reduce" => Ok(Self::Sum),
            other => Err(ScanErr::config(format!("unknown workload {other:?}"))),
        }
    }
}

/// Largest supported input length. Indices and the default random bound
/// are computed in 32 bits.
pub const MAX_ELEMS: usize = i32::MAX as usize;

/// Immutable parameters of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRunConfig")]
pub struct RunConfig {
    elems: usize,
    workers: NonZeroUsize,
    iterations: NonZeroUsize,
    #[serde(default)]
    backend: Backend,
}

/// A run configuration as written in a file, before validation.
#[derive(Deserialize)]
struct RawRunConfig {
    elems: usize,
    workers: usize,
    iterations: usize,
    #[serde(default)]
    backend: Backend,
}

impl TryFrom<RawRunConfig> for RunConfig {
    type Error = ScanErr;

    fn try_from(raw: RawRunConfig) -> Result<Self> {
        Self::new(raw.elems, raw.workers, raw.iterations, raw.backend)
    }
}

impl RunConfig {
    /// Creates a new run configuration.
    ///
    /// # Args
    /// * `elems` - Length of the input sequence.
    /// * `workers` - Number of workers sharing it.
    /// * `iterations` - Number of timed trials.
    /// * `backend` - How the workers run.
    ///
    /// # Errors
    /// `ScanErr::Config` if `workers` or `iterations` is zero, or if
    /// `elems` exceeds [`MAX_ELEMS`].
    pub fn new(elems: usize, workers: usize, iterations: usize, backend: Backend) -> Result<Self> {
        if elems > MAX_ELEMS {
            return Err(ScanErr::config(format!(
                "the number of elements must be at most {MAX_ELEMS}, got {elems}"
            )));
        }

        let workers = NonZeroUsize::new(workers)
            .ok_or_else(|| ScanErr::config("the number of workers must be at least 1"))?;
        let iterations = NonZeroUsize::new(iterations)
            .ok_or_else(|| ScanErr::config("the number of iterations must be at least 1"))?;

        Ok(Self {
            elems,
            workers,
            iterations,
            backend,
        })
    }

    pub fn elems(&self) -> usize {
        self.elems
    }

    pub fn workers(&self) -> usize {
        self.workers.get()
    }

    pub fn iterations(&self) -> NonZeroUsize {
        self.iterations
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Name of the stats file for `workload`, e.g.
    /// `prefixsum_mpi_80elems_1iters_8procs.txt`.
    pub fn stats_file_name(&self, workload: Workload) -> String {
        format!(
            "{}_{}_{}elems_{}iters_{}{}.txt",
            workload.file_prefix(),
            self.backend.tag(),
            self.elems,
            self.iterations,
            self.workers,
            self.backend.unit()
        )
    }
}

/// Parses a non negative count given on the command line or environment.
pub fn parse_count(name: &str, value: &str) -> Result<usize> {
    let n: i64 = value
        .trim()
        .parse()
        .map_err(|_| ScanErr::config(format!("{name} must be an integer, got {value:?}")))?;

    usize::try_from(n).map_err(|_| ScanErr::config(format!("{name} must not be negative, got {n}")))
}
