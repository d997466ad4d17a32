//! Distributed inclusive prefix sum and sum reduction over a partitioned
//! integer sequence.
//!
//! Every worker owns one contiguous partition, scans it locally, and then
//! receives the total of everything before it through a linear chain of
//! carries. Two backends run the same steps: independent ranks exchanging
//! messages, or threads sharing one buffer.

pub mod backend;
pub mod chain;
pub mod config;
pub mod context;
pub mod error;
pub mod local;
pub mod partition;
pub mod provider;
pub mod timing;
pub mod verify;
pub mod worker;

pub use backend::{ReduceOutcome, ScanOutcome, run_reduce, run_scan};
pub use config::{Backend, RunConfig, Workload};
pub use error::{Result, ScanErr, exit_code_of};
pub use provider::{DataProvider, InputSpec};
pub use timing::{IterationStats, StatsReport};
pub use verify::{Verification, verify_scan, verify_sum};
