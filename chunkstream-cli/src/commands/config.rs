//! Configuration CLI commands.
//!
//! Provides `config show` and `config check` for inspecting configuration
//! files from the command line.

use std::path::PathBuf;

use clap::Subcommand;

use super::load_config;
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as INI
    Show {
        /// Configuration file; defaults apply to anything it leaves out
        #[arg(long, short)]
        config: Option<PathBuf>,
    },

    /// Validate a configuration file
    Check {
        /// Configuration file to validate
        file: PathBuf,
    },
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show { config } => run_show(config),
        ConfigCommands::Check { file } => run_check(file),
    }
}

fn run_show(path: Option<PathBuf>) -> Result<(), CliError> {
    let config = load_config(path.as_deref())?;
    print!("{}", config.to_ini_string());
    Ok(())
}

fn run_check(file: PathBuf) -> Result<(), CliError> {
    let config = load_config(Some(&file))?;
    config.validate()?;

    println!("{}: OK", file.display());
    println!(
        "  chunk size {} at resolution {}, load radius {}, retain radius {}",
        config.world.chunk_size,
        config.world.resolution,
        config.streaming.load_radius,
        config.retain_radius()
    );
    println!(
        "  {} concurrent tasks, LOD 0..={}",
        config.scheduler.max_concurrent_tasks, config.world.max_lod_level
    );
    Ok(())
}
