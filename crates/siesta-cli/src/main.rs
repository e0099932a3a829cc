//! Siesta host driver
//!
//! Owns the tick loop for a scheduler, loads its configuration from TOML and
//! runs synthetic workloads to show how the pool grows and shrinks.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "siesta")]
#[command(about = "Drive a siesta scheduler from the command line", long_about = None)]
#[command(version)]
struct Cli {
    /// Log scheduler decisions (worker spawn, despawn, reclaim)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a synthetic workload and report pool behaviour
    Run {
        /// Scheduler config file (TOML); defaults are used when absent
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Tasks placed on the worker pool
        #[arg(short, long, default_value_t = 32)]
        tasks: usize,
        /// Tasks placed on the tick thread
        #[arg(long, default_value_t = 4)]
        local_tasks: usize,
        /// Pool tasks that fail on purpose
        #[arg(long, default_value_t = 0)]
        failing: usize,
        /// Busy time per task stage, in milliseconds
        #[arg(long, default_value_t = 5)]
        work_ms: u64,
        /// Nap between the two stages of each task, in milliseconds
        #[arg(long, default_value_t = 20)]
        nap_ms: u64,
        /// Delay between ticks, in milliseconds
        #[arg(long, default_value_t = 10)]
        tick_ms: u64,
        /// Give up after this many seconds
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },

    /// Print the default configuration as TOML
    Config {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            config,
            tasks,
            local_tasks,
            failing,
            work_ms,
            nap_ms,
            tick_ms,
            timeout_secs,
        } => {
            let workload = commands::run::Workload {
                tasks,
                local_tasks,
                failing,
                work: std::time::Duration::from_millis(work_ms),
                nap: std::time::Duration::from_millis(nap_ms),
            };
            let pacing = commands::run::Pacing {
                tick: std::time::Duration::from_millis(tick_ms),
                timeout: std::time::Duration::from_secs(timeout_secs),
            };
            commands::run::execute(config.as_deref(), &workload, &pacing)
        }

        Commands::Config { output } => commands::config::execute(output.as_deref()),
    }
}
