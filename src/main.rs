// TASALIGN v0.3.2 -- TAS GATE SCHEDULE ALIGNMENT
// COARSE-TO-FINE SEARCH FOR A TSN GATE WINDOW ALIGNED TO A LIDAR STREAM
//
// THE SEARCH, SCORING AND SAFETY LOGIC LIVE IN THE LIBRARY.
// THIS BINARY HANDLES: CONFIGURATION, SIGNALS, LOGGING, REPORTING.

mod cli;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use tasalign::config::RunConfig;

#[derive(Parser)]
#[command(name = "tasalign")]
#[command(about = "TASALIGN -- TAS GATE SCHEDULE ALIGNMENT FOR PERIODIC SENSOR STREAMS")]
struct Cli {
    // RUN CONFIGURATION (JSON). DEFAULTS TO THE 781.25US BENCH PROFILE
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    // DEBUG-LEVEL LOGGING
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    // FULL SUPERVISED RUN: BOOTSTRAP, COARSE, FINE, SOAK
    Search(cli::SearchArgs),
    // SAME RUN AGAINST THE SIMULATED SWITCH + SENSOR (VIRTUAL TIME)
    Simulate(cli::simulate::SimulateArgs),
    // APPLY ONE FRONT/OPEN/BACK + PHASE PROFILE
    Apply(cli::apply::ApplyArgs),
    // APPLY THE SAFE (ALL-OPEN) SCHEDULE AND RESET THE SENSOR
    Restore,
    // PRINT THE SWITCH PTP TIME
    Time,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::Relaxed);
    })?;

    let cfg = RunConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Command::Search(args) => cli::search::run_search(cfg, &args, shutdown),
        Command::Simulate(args) => cli::simulate::run_simulate(cfg, &args, shutdown),
        Command::Apply(args) => cli::apply::run_apply(&cfg, &args),
        Command::Restore => cli::restore::run_restore(&cfg),
        Command::Time => cli::time::run_time(&cfg),
    }
}
