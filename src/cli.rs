//! Command-line interface for wildsim
//!
//! The prototype is simulation-only: every run is headless. Without a
//! scenario file a small built-in demo scenario is used.

use clap::Parser;
use std::path::PathBuf;

/// Survival RPG ability & combat simulator
#[derive(Parser, Debug)]
#[command(name = "wildsim")]
#[command(about = "Survival RPG ability & combat simulator")]
#[command(version)]
pub struct Args {
    /// Run the specified JSON scenario file (default: built-in demo)
    #[arg(long, value_name = "SCENARIO_FILE")]
    pub scenario: Option<PathBuf>,

    /// Output path for the combat log
    #[arg(long, value_name = "OUTPUT_PATH")]
    pub output: Option<PathBuf>,

    /// Override the scenario's maximum duration in seconds
    #[arg(long)]
    pub max_duration: Option<f32>,

    /// Override the scenario's random seed
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn parse_args() -> Args {
    Args::parse()
}
