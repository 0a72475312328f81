//! Metaloop - adaptive plan/config tuning loop
//!
//! Each `run` performs exactly one round and prints its receipt as JSON on
//! stdout. Logs go to stderr.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::{self, EnvFilter};

mod cli;

#[derive(Parser)]
#[command(name = "metaloop")]
#[command(about = "Adaptive plan/config tuning with UCB1 and rubric scoring", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Set log level
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Configuration document (overrides METALOOP_CFG and the default)
    #[arg(long, env = "METALOOP_CFG", global = true)]
    config: Option<PathBuf>,

    /// Persisted state file (overrides METALOOP_STATE and the default)
    #[arg(long, env = "METALOOP_STATE", global = true)]
    state: Option<PathBuf>,

    /// Receipt log (overrides METALOOP_RECEIPTS and the default)
    #[arg(long, env = "METALOOP_RECEIPTS", global = true)]
    receipts: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one round and print its receipt
    Run {
        /// Task description handed to the executor
        task: String,

        /// Seed for the simulated executor
        #[arg(long)]
        seed: Option<u64>,

        /// Pretty-print the receipt
        #[arg(long)]
        pretty: bool,
    },

    /// Show selector state, policy, and the best arms so far
    Status,

    /// Roll up the receipt log and check guardrails
    Report {
        /// Fail when the overall pass rate is below this value
        #[arg(long)]
        min_pass_rate: Option<f64>,

        /// Fail when the mean score is below this value
        #[arg(long)]
        min_avg_score: Option<f64>,
    },

    /// Validate a rubric, optionally evaluating it
    Rubric {
        /// Rubric expression, e.g. "2*pass - 0.1*time"
        expression: String,

        /// Telemetry values to evaluate against
        #[arg(value_name = "KEY=VALUE")]
        telemetry: Vec<String>,
    },

    /// Discard persisted state (cold start on the next run)
    Reset,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let level = level.as_str().to_lowercase();
    let filter = EnvFilter::new(format!("metaloop={level},metaloop_core={level}"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!("Metaloop v{} starting...", env!("CARGO_PKG_VERSION"));

    let paths = cli::helpers::resolve_paths(cli.config, cli.state, cli.receipts);

    match cli.command {
        Commands::Run { task, seed, pretty } => cli::run::handle(&paths, &task, seed, pretty),
        Commands::Status => cli::status::handle(&paths),
        Commands::Report {
            min_pass_rate,
            min_avg_score,
        } => cli::report::handle(&paths, min_pass_rate, min_avg_score),
        Commands::Rubric {
            expression,
            telemetry,
        } => cli::rubric::handle(&paths, &expression, &telemetry),
        Commands::Reset => cli::reset::handle(&paths),
    }
}
