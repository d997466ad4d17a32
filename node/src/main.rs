//! One rank of the process based message passing backend.
//!
//! Every rank is started with the same environment apart from `RANK`, and
//! `PORT` is the base port the chain is formed on.

use std::{env, fmt, fs, num::NonZeroUsize, process::ExitCode};

use anyhow::{Context, bail};
use log::{error, info};
use scan::{
    Backend, InputSpec, RunConfig, ScanErr, StatsReport, Workload,
    backend::message_passing::{reduce_rank, scan_rank},
    config::parse_count,
    exit_code_of,
    partition::PartitionTable,
    provider::materialize,
    verify::{verify_partition, verify_sum},
    worker::WorkerState,
};
use tokio::signal;

use node::{TcpRank, join_chain};

const DEFAULT_HOST: &str = "127.0.0.1";

#[derive(Debug, Clone, Copy)]
enum Mode {
    Run(Workload),
    Latency,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run(Workload::Scan) => f.write_str("scan"),
            Self::Run(Workload::Sum) => f.write_str("sum"),
            Self::Latency => f.write_str("latency"),
        }
    }
}

struct NodeConfig {
    host: String,
    port: u16,
    rank: usize,
    run: RunConfig,
    mode: Mode,
    input: InputSpec,
    verify: bool,
}

fn var(name: &str) -> anyhow::Result<String> {
    env::var(name).with_context(|| format!("{name} is not set"))
}

fn count(name: &str) -> anyhow::Result<usize> {
    Ok(parse_count(name, &var(name)?)?)
}

impl NodeConfig {
    fn from_env() -> anyhow::Result<Self> {
        let host = env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let port = var("PORT")?.parse().context("PORT must be a port number")?;
        let rank = count("RANK")?;
        let workers = count("WORKERS")?;
        let elems = count("ELEMS")?;
        let iterations = count("ITERS")?;

        let mode = match env::var("MODE").as_deref() {
            Ok("latency") => Mode::Latency,
            Ok(other) => Mode::Run(other.parse()?),
            Err(_) => Mode::Run(Workload::Scan),
        };

        // Scans default to all ones, sums to seeded random values.
        let seed = match env::var("SEED") {
            Ok(seed) => Some(seed.parse().context("SEED must be an unsigned integer")?),
            Err(_) => None,
        };
        let input = match (mode, seed) {
            (_, Some(seed)) => InputSpec::Random { seed },
            (Mode::Run(Workload::Sum), None) => InputSpec::Random { seed: 0 },
            _ => InputSpec::default(),
        };

        let run = RunConfig::new(elems, workers, iterations, Backend::MessagePassing)?;
        if rank >= workers {
            return Err(ScanErr::Config(format!("RANK {rank} is outside [0, {workers})")).into());
        }

        Ok(Self {
            host,
            port,
            rank,
            run,
            mode,
            input,
            verify: env::var("VERIFY").is_ok_and(|v| v != "0"),
        })
    }
}

fn write_stats(cfg: &NodeConfig, workload: Workload, report: &StatsReport) -> anyhow::Result<()> {
    let file_name = cfg.run.stats_file_name(workload);
    let command_line = format!(
        "node with WORKERS={} ELEMS={} ITERS={} MODE={}",
        cfg.run.workers(),
        cfg.run.elems(),
        cfg.run.iterations(),
        cfg.mode
    );

    let mut out = Vec::new();
    let runner = Backend::MessagePassing.runner();
    report.write_stats_file(&mut out, &command_line, &file_name, runner)?;

    print!("{}", String::from_utf8_lossy(&out));
    fs::write(&file_name, &out)
        .with_context(|| format!("can't write the stats file {file_name}"))?;

    info!(
        mean = report.mean_micros(),
        std_dev = report.std_dev_micros();
        "stats written to {file_name}"
    );
    Ok(())
}

async fn run_workload(
    cfg: &NodeConfig,
    chain: &mut TcpRank,
    workload: Workload,
) -> anyhow::Result<()> {
    let elems = cfg.run.elems();
    let table = PartitionTable::new(elems, cfg.run.workers())?;
    let part = *table
        .get(cfg.rank)
        .ok_or_else(|| ScanErr::Config(format!("RANK {} has no partition", cfg.rank)))?;
    let provider = cfg.input.build(elems);

    let mut state = match WorkerState::allocate(part, &*provider) {
        Ok(state) => state,
        Err(e) => {
            error!("{e}");
            chain.notify_failure(&e).await;
            return Err(e.into());
        }
    };

    let iterations = cfg.run.iterations();
    let stats = match workload {
        Workload::Scan => {
            let stats = scan_rank(chain, &mut state, iterations).await?;

            if cfg.verify {
                let input = materialize(&*provider, part.end);
                verify_partition(&input, &part, state.buffer()).into_result()?;
                info!(rank = cfg.rank; "partition verified");
            }

            stats
        }
        Workload::Sum => {
            let (sum, stats) = reduce_rank(chain, &state, iterations).await?;

            if let Some(sum) = sum {
                println!("Sum: {sum}");

                if cfg.verify {
                    verify_sum(&materialize(&*provider, elems), sum).into_result()?;
                    info!("sum verified");
                }
            }

            stats
        }
    };

    if chain.is_root() {
        write_stats(cfg, workload, &StatsReport::new(workload.label(), &stats))?;
    }

    Ok(())
}

async fn run_latency(chain: &mut TcpRank, rounds: NonZeroUsize) -> anyhow::Result<()> {
    let stats = chain.round_trip(rounds).await?;

    if chain.is_root() {
        for s in &stats {
            println!("Round-trip latency: {} usec", s.elapsed_micros);
        }

        let report = StatsReport::new("Round-trip latency", &stats);
        println!(
            "\nRound-trip latency average: {} usec, standard deviation: {:.2} usec",
            report.mean_micros(),
            report.std_dev_micros()
        );
    }

    Ok(())
}

async fn run(cfg: NodeConfig) -> anyhow::Result<()> {
    let mut chain = join_chain(&cfg.host, cfg.port, cfg.rank, cfg.run.workers()).await?;
    info!(rank = cfg.rank, workers = cfg.run.workers(); "joined the chain");

    match cfg.mode {
        Mode::Run(workload) => run_workload(&cfg, &mut chain, workload).await,
        Mode::Latency => run_latency(&mut chain, cfg.run.iterations()).await,
    }
}

async fn start() -> anyhow::Result<()> {
    let cfg = NodeConfig::from_env()?;

    tokio::select! {
        ret = run(cfg) => ret,
        _ = signal::ctrl_c() => bail!("interrupted"),
    }
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
