use std::{
    env, fs,
    io::{self, Write},
    process::ExitCode,
    sync::Arc,
};

use anyhow::Context;
use log::{error, info};
use scan::{
    Backend, DataProvider, InputSpec, RunConfig, ScanErr, StatsReport, Workload,
    config::parse_count, exit_code_of,
    provider::materialize,
    run_reduce, run_scan,
    timing::write_indexed,
    verify_scan, verify_sum,
};
use serde::Deserialize;

const USAGE: &str = "\
Usage: prefixsum <scan|sum> <num_elems> <num_iters> <num_workers>
       prefixsum <scan|sum> <config.json>
    - num_elems:   number of elements
    - num_iters:   number of iterations
    - num_workers: number of workers
Environment: BACKEND=message_passing|shared_memory, INPUT=ones|random, SEED=<u64>, DUMP=1";

/// A run described by a JSON file.
#[derive(Deserialize)]
struct RunFile {
    #[serde(flatten)]
    run: RunConfig,
    #[serde(default)]
    input: Option<InputSpec>,
}

struct Bench {
    workload: Workload,
    run: RunConfig,
    input: InputSpec,
    command_line: String,
    dump: bool,
}

fn usage(msg: impl Into<String>) -> anyhow::Error {
    ScanErr::Config(msg.into()).into()
}

fn input_from_env(workload: Workload) -> anyhow::Result<InputSpec> {
    let seed = match env::var("SEED") {
        Ok(seed) => seed.parse().context("SEED must be an unsigned integer")?,
        Err(_) => 0,
    };

    match env::var("INPUT").as_deref() {
        Ok("ones") => Ok(InputSpec::Constant { value: 1 }),
        Ok("random") => Ok(InputSpec::Random { seed }),
        Ok(other) => Err(usage(format!("INPUT must be ones or random, got {other:?}"))),
        Err(_) => Ok(match workload {
            Workload::Scan => InputSpec::default(),
            Workload::Sum => InputSpec::Random { seed },
        }),
    }
}

impl Bench {
    fn from_args(args: &[String]) -> anyhow::Result<Self> {
        let (workload, rest) = match args {
            [_, workload, rest @ ..] => (workload.parse::<Workload>()?, rest),
            _ => return Err(usage("missing workload")),
        };

        let (run, input) = match rest {
            [path] => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("can't read the config file {path}"))?;
                let file: RunFile = serde_json::from_str(&text)
                    .map_err(|e| usage(format!("invalid config file {path}: {e}")))?;

                let input = match file.input {
                    Some(input) => input,
                    None => input_from_env(workload)?,
                };
                (file.run, input)
            }
            [elems, iters, workers] => {
                let backend = match env::var("BACKEND") {
                    Ok(backend) => backend.parse()?,
                    Err(_) => Backend::default(),
                };

                let run = RunConfig::new(
                    parse_count("num_elems", elems)?,
                    parse_count("num_workers", workers)?,
                    parse_count("num_iters", iters)?,
                    backend,
                )?;
                (run, input_from_env(workload)?)
            }
            _ => return Err(usage("wrong number of arguments")),
        };

        Ok(Self {
            workload,
            run,
            input,
            command_line: args.join(" "),
            dump: env::var("DUMP").is_ok_and(|v| v != "0"),
        })
    }

    async fn run(&self) -> anyhow::Result<()> {
        let elems = self.run.elems();
        let provider: Arc<dyn DataProvider> = self.input.build(elems).into();
        let file_name = self.run.stats_file_name(self.workload);

        let mut out = Vec::new();
        let result = match self.workload {
            Workload::Scan => {
                let outcome = run_scan(&self.run, provider.clone()).await?;
                let report = StatsReport::new(self.workload.label(), &outcome.stats);
                self.write_header(&mut out, &report, &file_name)?;

                let scan = outcome.concatenated();
                if self.dump {
                    let input = materialize(&*provider, elems);
                    write!(out, "\nInputs:")?;
                    write_indexed(&mut out, 0, &input)?;
                    write!(out, "\n\nPrefix Sums:")?;
                    write_indexed(&mut out, 0, &scan)?;
                    writeln!(out)?;
                }

                info!(carries = outcome.carries; "carries passed");
                log_spread(&report);
                Checked::Scan(scan)
            }
            Workload::Sum => {
                let outcome = run_reduce(&self.run, provider.clone()).await?;
                let report = StatsReport::new(self.workload.label(), &outcome.stats);
                self.write_header(&mut out, &report, &file_name)?;
                writeln!(out, "\nSum: {}", outcome.sum)?;

                log_spread(&report);
                Checked::Sum(outcome.sum)
            }
        };

        io::stdout().write_all(&out)?;
        fs::write(&file_name, &out)
            .with_context(|| format!("can't write the stats file {file_name}"))?;

        let input = materialize(&*provider, elems);
        let verification = match result {
            Checked::Scan(scan) => verify_scan(&input, &scan),
            Checked::Sum(sum) => verify_sum(&input, sum),
        };
        verification.into_result()?;

        info!("result verified against the sequential baseline");
        Ok(())
    }

    fn write_header(
        &self,
        out: &mut Vec<u8>,
        report: &StatsReport,
        file_name: &str,
    ) -> io::Result<()> {
        let runner = self.run.backend().runner();
        report.write_stats_file(out, &self.command_line, file_name, runner)
    }
}

enum Checked {
    Scan(Vec<i64>),
    Sum(i64),
}

fn log_spread(report: &StatsReport) {
    info!(
        mean = report.mean_micros(),
        std_dev = report.std_dev_micros();
        "elapsed time spread (usec)"
    );
}

async fn start() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    let bench = match Bench::from_args(&args) {
        Ok(bench) => bench,
        Err(e) => {
            eprintln!("{USAGE}");
            return Err(e);
        }
    };

    bench.run().await
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    match start().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(exit_code_of(e.chain()))
        }
    }
}
