mod analysis;
mod block;
mod blocktree;
mod config;
mod driver;
mod error;
mod event;
mod ids;
mod network;
mod peer;
mod render;
mod transaction;

use clap::Parser;
use log::{error, info};
use std::time::{SystemTime, UNIX_EPOCH};

use config::{Cli, SimConfig};
use driver::Simulation;
use error::SimError;

fn main() {
    pretty_env_logger::init();

    if let Err(err) = run() {
        error!("run failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), SimError> {
    let cli = Cli::parse();
    let fallback_seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let config = SimConfig::from_cli(cli, fallback_seed)?;

    info!(
        "starting run: {} peers, zeta1={}% zeta2={}%, seed={}",
        config.num_peers, config.zeta1_pct, config.zeta2_pct, config.seed
    );

    let mut sim = Simulation::new(config.clone());
    sim.run()?;

    let report = analysis::build_report(&sim);
    analysis::write_report(&config, &report)?;
    info!("wrote analysis to {}/{}", config.output_root, config.output_dir_name());

    Ok(())
}
