mod analysis;
mod arena;
mod config;
mod fitness;
mod genome;
mod manager;
mod model;
mod motion;
mod perception;
mod population;
mod record;
mod scheduler;
mod selection;
mod stats;
mod utility;

use crate::manager::Manager;
use crate::model::Species;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    #[arg(long)]
    sim_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a new run from the config in the simulation directory.
    Create,

    /// Simulate more generations of an existing run.
    Resume {
        #[arg(long)]
        run_idx: usize,

        /// Close the interrupted generation before resuming.
        #[arg(long)]
        advance: bool,
    },

    /// Respawn one species of a stopped run.
    Generate {
        #[arg(long)]
        run_idx: usize,

        #[arg(long)]
        species: Species,
    },

    Analyze,

    Clean,
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::info!("{args:#?}");

    let mgr = Manager::new(args.sim_dir).context("failed to construct mgr")?;

    match args.command {
        Command::Create => mgr.create_run()?,
        Command::Resume { run_idx, advance } => mgr.resume_run(run_idx, advance)?,
        Command::Generate { run_idx, species } => mgr.generate_species(run_idx, species)?,
        Command::Analyze => mgr.analyze_sim()?,
        Command::Clean => mgr.clean_sim()?,
    }

    Ok(())
}
