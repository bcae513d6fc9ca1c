//! Chunkstream CLI - Command-line interface
//!
//! Runs headless streaming simulations and inspects configuration files.

mod commands;
mod error;

use std::process::ExitCode;

use chunkstream::logging::{init_logging, LoggingConfig};
use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::simulate::SimulateArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "chunkstream", version, about = "Observer-driven chunk streaming")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Stream a headless world around an observer moving along +x
    Simulate(SimulateArgs),

    /// Inspect configuration files
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Print the hashed value of a seed string
    Seed {
        /// Seed string
        seed: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut logging = LoggingConfig::default();
    if let Commands::Simulate(SimulateArgs {
        log_file: Some(path),
        ..
    }) = &cli.command
    {
        logging = logging.with_file(path.clone());
    }
    let _guard = init_logging(logging)?;

    match cli.command {
        Commands::Simulate(args) => commands::simulate::run(args),
        Commands::Config(command) => commands::config::run(command),
        Commands::Seed { seed } => {
            commands::seed::run(&seed);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_simulate_flags() {
        let cli = Cli::try_parse_from([
            "chunkstream",
            "simulate",
            "--ticks",
            "5",
            "--radius",
            "2.5",
            "--max-tasks",
            "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Simulate(args) => {
                assert_eq!(args.ticks, 5);
                assert_eq!(args.radius, Some(2.5));
                assert_eq!(args.max_tasks, Some(3));
                assert!(args.config.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_config_check() {
        let cli = Cli::try_parse_from(["chunkstream", "config", "check", "world.ini"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config(ConfigCommands::Check { .. })
        ));
    }
}
