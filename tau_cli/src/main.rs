use std::{
    env,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use shared_event_bus::FileEventPublisher;
use tau_collector::SeriesAggregator;
use tau_driver::{
    catalog, BatchDriver, DriverTelemetry, HttpTransport, RunConfig, SubmissionClient,
};
use tokio::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(name = "tau", version, about = "TAU remote-simulation batch driver")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submits one flat run per input row.
    Batch(RunArgs),
    /// Submits stepwise scenario runs and polls them to completion.
    Scenario(ScenarioArgs),
    /// Converts parquet output into CSV tables and summary series.
    Collect {
        /// Directory to search for parquet artifacts (defaults to the
        /// working directory).
        #[arg(long)]
        input_dir: Option<PathBuf>,
        #[arg(long, default_value = "scenarioOutputCSV")]
        output_dir: PathBuf,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// CSV of starting values for all parameters, one row per configuration.
    #[arg(long)]
    input: PathBuf,
    /// Number of simulation steps in a single run.
    #[arg(long)]
    steps: u64,
    /// Sequential repetitions per row (one submission each).
    #[arg(long, default_value_t = 1)]
    sequential_reps: usize,
    /// Parallel replications per submission (handled by the remote engine).
    #[arg(long, default_value_t = 1)]
    parallel_reps: usize,
    /// Name of the CSV file the model writes output to.
    #[arg(long, default_value = "csvOutput.csv")]
    output_file: String,
    #[arg(long, default_value = "localhost")]
    host: String,
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Retries per submission after the first failed attempt.
    #[arg(long, default_value_t = 10)]
    retry_attempts: u32,
    #[arg(long, default_value = "logs/tau.log.jsonl")]
    log_file: PathBuf,
    /// Optional JSONL file receiving run-lifecycle events.
    #[arg(long)]
    event_log: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ScenarioArgs {
    #[command(flatten)]
    run: RunArgs,
    /// CSV of per-step parameter overrides (see the scenario file format).
    #[arg(long)]
    scenario_input: PathBuf,
    /// Directory the remote engine writes parquet output to.
    #[arg(long, default_value = "scenarioOutput")]
    scenario_output_dir: String,
    /// Seconds between status polls while awaiting completion.
    #[arg(long, default_value_t = 10)]
    poll_interval: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Batch(args) => handle_batch(args),
        Commands::Scenario(args) => handle_scenario(args),
        Commands::Collect {
            input_dir,
            output_dir,
        } => handle_collect(input_dir, &output_dir),
    }
}

fn run_config(args: &RunArgs) -> RunConfig {
    RunConfig {
        host: args.host.clone(),
        port: args.port,
        steps: args.steps,
        sequential_reps: args.sequential_reps,
        parallel_reps: args.parallel_reps,
        output_file: args.output_file.clone(),
        retry_attempts: args.retry_attempts,
        ..RunConfig::default()
    }
}

fn build_telemetry(args: &RunArgs) -> Result<DriverTelemetry> {
    let mut builder = DriverTelemetry::builder("driver").log_path(&args.log_file);
    if let Some(path) = &args.event_log {
        builder = builder.event_publisher(Arc::new(FileEventPublisher::new(path)));
    }
    builder.build()
}

fn build_driver(args: &RunArgs, config: RunConfig) -> Result<BatchDriver> {
    let telemetry = build_telemetry(args)?;
    let client = SubmissionClient::new(
        Arc::new(HttpTransport::new()?),
        config.retry_attempts,
        telemetry.clone(),
    );
    Ok(BatchDriver::new(config, client, telemetry))
}

fn handle_batch(args: RunArgs) -> Result<()> {
    let config = run_config(&args);
    seed_output(&args)?;
    let driver = build_driver(&args, config)?;
    let summary = Runtime::new()?.block_on(driver.run_batch(&args.input))?;
    println!(
        "batch finished: {} accepted, {} failed",
        summary.accepted, summary.failed
    );
    Ok(())
}

fn handle_scenario(args: ScenarioArgs) -> Result<()> {
    let mut config = run_config(&args.run);
    config.scenario_output_dir = args.scenario_output_dir.clone();
    config.poll_interval_secs = args.poll_interval;
    seed_output(&args.run)?;
    let driver = build_driver(&args.run, config)?;
    let summary =
        Runtime::new()?.block_on(driver.run_scenarios(&args.run.input, &args.scenario_input))?;
    println!(
        "scenario runs finished: {} accepted, {} failed, {} skipped",
        summary.accepted, summary.failed, summary.skipped
    );
    Ok(())
}

fn handle_collect(input_dir: Option<PathBuf>, output_dir: &Path) -> Result<()> {
    let input = match input_dir {
        Some(dir) => dir,
        None => env::current_dir()?,
    };
    let mut aggregator = SeriesAggregator::new();
    let written = tau_collector::convert_directory(&input, output_dir, &mut aggregator)?;
    let summaries = aggregator.write_summaries(output_dir)?;
    println!(
        "collected {} tables and {} summary series into {}",
        written,
        summaries.len(),
        output_dir.display()
    );
    Ok(())
}

/// Seeds the output CSV with the full parameter/metric header before any
/// submission, fixing the file's schema for downstream consumers.
fn seed_output(args: &RunArgs) -> Result<()> {
    let path = catalog::seed_output_file(Path::new(catalog::CSV_OUTPUT_DIR), &args.output_file)?;
    println!("seeded output schema at {}", path.display());
    Ok(())
}
