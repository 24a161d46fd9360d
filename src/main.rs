//! chirpnet - Entry Point
//!
//! Loads a configuration document, builds the simulation (optionally from
//! a snapshot), runs the kinetic Monte Carlo loop, and maps the outcome to
//! a process exit code.

use std::path::PathBuf;

use clap::Parser;

use chirpnet::core::config::SimConfig;
use chirpnet::core::error::Result;
use chirpnet::simulation::kmc::{Simulation, StopReason};
use chirpnet::simulation::snapshot;

/// Agent-based follower-graph and message-propagation simulator
#[derive(Parser, Debug)]
#[command(name = "chirpnet")]
#[command(about = "Kinetic Monte Carlo social-network simulator")]
struct Args {
    /// Configuration document (JSON); defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Random seed for a reproducible run
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Resume from a previously written snapshot
    #[arg(long)]
    load_snapshot: Option<PathBuf>,

    /// Load a snapshot even when its configuration digest does not match
    #[arg(long)]
    ignore_config_mismatch: bool,
}

fn build(args: &Args) -> Result<Simulation> {
    let config = match &args.config {
        Some(path) => SimConfig::from_file(path)?,
        None => SimConfig::default(),
    };
    match &args.load_snapshot {
        Some(path) => {
            let snap = snapshot::load(path, config.digest(), args.ignore_config_mismatch)?;
            tracing::info!(time = snap.time, agents = snap.agents.len(), "resuming from snapshot");
            Simulation::from_snapshot(config, snap)
        }
        None => Simulation::new(config, args.seed),
    }
}

fn run(args: &Args) -> Result<StopReason> {
    let mut sim = build(args)?;
    sim.run()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("chirpnet=info")),
        )
        .init();

    let args = Args::parse();
    let code = match run(&args) {
        Ok(reason) => {
            tracing::info!(?reason, "done");
            0
        }
        Err(err) => {
            tracing::error!("{err}");
            err.exit_code()
        }
    };
    std::process::exit(code);
}
