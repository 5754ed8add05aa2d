use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use shardflow::builtin::{LineExtractor, ReferenceConsolidator};
use shardflow::config::{DEFAULT_CHECKPOINT_EVERY, DEFAULT_INPUT_EXTENSION};
use shardflow::logging::init_logging;
use shardflow::{BarrierConfig, PipelineConfig, PipelineError, WorkerPipeline, status};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "shardflow")]
#[command(about = "Checkpointed, file-coordinated batch extraction across worker processes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run this worker's pipeline; worker 0 also aggregates
    Run(LaunchArgs),
    /// Show per-worker progress from the artifacts on disk
    Status(LaunchArgs),
}

#[derive(Args)]
struct LaunchArgs {
    /// Id of this worker, in [0, num_workers)
    #[arg(long, env = "SHARDFLOW_WORKER_ID")]
    worker_id: usize,
    #[arg(long, env = "SHARDFLOW_NUM_WORKERS")]
    num_workers: usize,
    #[arg(long, env = "SHARDFLOW_INPUT_DIR")]
    input_dir: PathBuf,
    #[arg(long, env = "SHARDFLOW_CHECKPOINT_DIR")]
    checkpoint_dir: PathBuf,
    #[arg(long, env = "SHARDFLOW_OUTPUT_DIR")]
    output_dir: PathBuf,
    #[arg(long, env = "SHARDFLOW_STATS_DIR")]
    stats_dir: PathBuf,
    /// Only files with this extension are processed
    #[arg(long, env = "SHARDFLOW_INPUT_EXTENSION", default_value = DEFAULT_INPUT_EXTENSION)]
    input_extension: String,
    /// Flush extraction progress every this many files
    #[arg(long, env = "SHARDFLOW_CHECKPOINT_EVERY", default_value_t = DEFAULT_CHECKPOINT_EVERY)]
    checkpoint_every: usize,
    /// Seconds the master sleeps between barrier rounds
    #[arg(long, env = "SHARDFLOW_POLL_INTERVAL_SECS", default_value_t = 5)]
    poll_interval_secs: u64,
    /// Milliseconds spent on one lock attempt
    #[arg(long, env = "SHARDFLOW_LOCK_TIMEOUT_MS", default_value_t = 100)]
    lock_timeout_ms: u64,
    /// Give up waiting for stragglers after this many seconds
    #[arg(long, env = "SHARDFLOW_MAX_WAIT_SECS")]
    max_wait_secs: Option<u64>,
}

impl LaunchArgs {
    fn into_config(self) -> PipelineConfig {
        let barrier = BarrierConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
            max_wait: self.max_wait_secs.map(Duration::from_secs),
        };
        PipelineConfig::new(
            self.worker_id,
            self.num_workers,
            self.input_dir,
            self.checkpoint_dir,
            self.output_dir,
            self.stats_dir,
        )
        .with_input_extension(self.input_extension)
        .with_checkpoint_every(self.checkpoint_every)
        .with_barrier(barrier)
    }
}

fn run(config: &PipelineConfig) -> Result<(), PipelineError> {
    let summary = WorkerPipeline::new(config, LineExtractor, ReferenceConsolidator).run()?;
    info!(
        worker = %config.scope(),
        records = summary.output_records,
        resumed_from = ?summary.resumed_from,
        "local pipeline complete"
    );
    if let Some(report) = summary.aggregate {
        info!(
            input_records = report.input_records,
            final_records = report.final_records,
            output = %report.output_path.display(),
            "aggregation complete"
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    dotenv().ok();
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => run(&args.into_config()),
        Commands::Status(args) => status::collect(&args.into_config()).map(|report| println!("{}", report)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
