//! Trial timing and the stats report format.

use std::{
    fmt,
    io::{self, Write},
    num::NonZeroUsize,
    time::{Duration, Instant},
};

use log::debug;
use serde::Serialize;

use crate::error::Result;

/// Elapsed wall clock time of one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IterationStats {
    pub iteration: usize,
    pub elapsed_micros: i64,
}

/// One repeatable unit of timed work, as seen by a single worker.
#[allow(unused)]
#[trait_variant::make(Trial: Send)]
pub trait LocalTrial {
    /// Restores the worker's buffer from the canonical input.
    async fn reset(&mut self) -> Result<()>;

    /// Waits until every worker has reached the same point.
    async fn barrier(&mut self) -> Result<()>;

    /// The work being measured.
    async fn compute(&mut self) -> Result<()>;
}

/// Accumulates the per iteration timings of a run.
#[derive(Debug, Default)]
pub struct TimingHarness {
    stats: Vec<IterationStats>,
}

impl TimingHarness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `iterations` trials of `trial`.
    ///
    /// Each iteration resets, then synchronizes, then starts the clock
    /// around `compute` only.
    ///
    /// # Errors
    /// The first error of any step; no further trials are attempted.
    pub async fn run_trials<T: Trial>(
        &mut self,
        trial: &mut T,
        iterations: NonZeroUsize,
    ) -> Result<&[IterationStats]> {
        for _ in 0..iterations.get() {
            trial.reset().await?;
            trial.barrier().await?;

            let start = Instant::now();
            trial.compute().await?;
            self.record(start.elapsed());
        }

        Ok(&self.stats)
    }

    /// Appends one measurement.
    pub fn record(&mut self, elapsed: Duration) {
        let iteration = self.stats.len();
        let elapsed_micros = i64::try_from(elapsed.as_micros()).unwrap_or(i64::MAX);

        debug!(iteration = iteration, elapsed_micros = elapsed_micros; "trial finished");
        self.stats.push(IterationStats {
            iteration,
            elapsed_micros,
        });
    }

    pub fn into_stats(self) -> Vec<IterationStats> {
        self.stats
    }
}

/// Renders timings in the stats file format:
///
/// ```text
/// iteration 0 elapsed time: 12 (usec)
/// iteration 1 elapsed time: 10 (usec)
///
/// Prefix Sum average elapsed time: 11 (usec)
/// ```
pub struct StatsReport<'a> {
    label: &'a str,
    stats: &'a [IterationStats],
}

impl<'a> StatsReport<'a> {
    pub fn new(label: &'a str, stats: &'a [IterationStats]) -> Self {
        Self { label, stats }
    }

    /// Integer mean of the elapsed times, 0 when there are none.
    pub fn mean_micros(&self) -> i64 {
        let total: i64 = self.stats.iter().map(|s| s.elapsed_micros).sum();
        match self.stats.len() {
            0 => 0,
            n => total / n as i64,
        }
    }

    /// Population standard deviation of the elapsed times.
    pub fn std_dev_micros(&self) -> f64 {
        if self.stats.is_empty() {
            return 0.0;
        }

        let n = self.stats.len() as f64;
        let mean = self.stats.iter().map(|s| s.elapsed_micros as f64).sum::<f64>() / n;
        let variance = self
            .stats
            .iter()
            .map(|s| (s.elapsed_micros as f64 - mean).powi(2))
            .sum::<f64>()
            / n;

        variance.sqrt()
    }

    pub fn write_iterations<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for s in self.stats {
            writeln!(
                w,
                "iteration {} elapsed time: {} (usec)",
                s.iteration, s.elapsed_micros
            )?;
        }

        Ok(())
    }

    pub fn write_average<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(
            w,
            "{} average elapsed time: {} (usec)",
            self.label,
            self.mean_micros()
        )
    }

    /// Writes a complete stats file: the command line header, every
    /// iteration, the finish banner and the average.
    ///
    /// # Arguments
    /// * `command_line` - How the run was started.
    /// * `file_name` - Name of the stats file itself.
    /// * `runner` - Who ran it, e.g. `MPI Parallel`.
    pub fn write_stats_file<W: Write>(
        &self,
        w: &mut W,
        command_line: &str,
        file_name: &str,
        runner: &str,
    ) -> io::Result<()> {
        writeln!(w, "Command line: {command_line}")?;
        writeln!(w, "Stats file: {file_name}\n")?;
        writeln!(w, "Start ...")?;
        self.write_iterations(w)?;
        writeln!(w, "Finish {runner} {} calculation\n", self.label)?;
        self.write_average(w)
    }
}

/// Writes ` <index>:<value>` for every value, the first one at `start`.
pub fn write_indexed<W: Write, T: fmt::Display>(
    w: &mut W,
    start: usize,
    values: &[T],
) -> io::Result<()> {
    for (i, v) in values.iter().enumerate() {
        write!(w, " {}:{v}", start + i)?;
    }

    Ok(())
}

impl fmt::Display for StatsReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for s in self.stats {
            writeln!(
                f,
                "iteration {} elapsed time: {} (usec)",
                s.iteration, s.elapsed_micros
            )?;
        }

        writeln!(f)?;
        writeln!(
            f,
            "{} average elapsed time: {} (usec)",
            self.label,
            self.mean_micros()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(micros: &[i64]) -> Vec<IterationStats> {
        micros
            .iter()
            .enumerate()
            .map(|(iteration, &elapsed_micros)| IterationStats {
                iteration,
                elapsed_micros,
            })
            .collect()
    }

    #[test]
    fn report_format() {
        let stats = stats(&[12, 10, 11]);
        let report = StatsReport::new("Prefix Sum", &stats);

        assert_eq!(
            report.to_string(),
            "iteration 0 elapsed time: 12 (usec)\n\
             iteration 1 elapsed time: 10 (usec)\n\
             iteration 2 elapsed time: 11 (usec)\n\
             \n\
             Prefix Sum average elapsed time: 11 (usec)\n"
        );

        let mut out = Vec::new();
        report.write_iterations(&mut out).unwrap();
        report.write_average(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with("Prefix Sum average elapsed time: 11 (usec)\n"));
    }

    #[test]
    fn stats_file_layout() {
        let stats = stats(&[5, 7]);
        let mut out = Vec::new();
        StatsReport::new("Sum", &stats)
            .write_stats_file(
                &mut out,
                "sum 2 2 4",
                "sum_mpi_2elems_2iters_4procs.txt",
                "MPI Parallel",
            )
            .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Command line: sum 2 2 4\n\
             Stats file: sum_mpi_2elems_2iters_4procs.txt\n\
             \n\
             Start ...\n\
             iteration 0 elapsed time: 5 (usec)\n\
             iteration 1 elapsed time: 7 (usec)\n\
             Finish MPI Parallel Sum calculation\n\
             \n\
             Sum average elapsed time: 6 (usec)\n"
        );
    }

    #[test]
    fn indexed_values() {
        let mut out = Vec::new();
        write_indexed(&mut out, 4, &[10, 11]).unwrap();
        assert_eq!(out, b" 4:10 5:11");
    }

    #[test]
    fn mean_truncates_like_integer_division() {
        let stats = stats(&[1, 2]);
        assert_eq!(StatsReport::new("Sum", &stats).mean_micros(), 1);
        assert_eq!(StatsReport::new("Sum", &[]).mean_micros(), 0);
    }

    #[test]
    fn std_dev() {
        let stats = stats(&[2, 4, 4, 4, 5, 5, 7, 9]);
        let sd = StatsReport::new("Sum", &stats).std_dev_micros();
        assert!((sd - 2.0).abs() < 1e-9);
    }

    struct Recorder {
        log: Vec<&'static str>,
    }

    impl Trial for Recorder {
        async fn reset(&mut self) -> Result<()> {
            self.log.push("reset");
            Ok(())
        }

        async fn barrier(&mut self) -> Result<()> {
            self.log.push("barrier");
            Ok(())
        }

        async fn compute(&mut self) -> Result<()> {
            self.log.push("compute");
            Ok(())
        }
    }

    #[tokio::test]
    async fn steps_run_in_order() {
        let mut trial = Recorder { log: Vec::new() };
        let mut harness = TimingHarness::new();

        let iterations = NonZeroUsize::new(2).unwrap();
        let stats = harness.run_trials(&mut trial, iterations).await.unwrap();

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[1].iteration, 1);
        assert_eq!(
            trial.log,
            ["reset", "barrier", "compute", "reset", "barrier", "compute"]
        );
    }
}
