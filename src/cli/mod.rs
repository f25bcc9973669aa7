//! CLI module for Runscribe
//!
//! Argument parsing and subcommand handling for the `runscribe` binary.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Runscribe - records orchestration runs as AsciiDoc reports
#[derive(Parser, Debug, Clone)]
#[command(name = "runscribe")]
#[command(version)]
#[command(about = "Records orchestration runs as AsciiDoc reports", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "RUNSCRIBE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Report root folder (overrides `recorder.log_folder`)
    #[arg(long, global = true)]
    pub folder: Option<PathBuf>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Replay a JSON-lines event log into a report tree
    Replay(commands::replay::ReplayArgs),

    /// Print the effective configuration
    Config(commands::show_config::ConfigArgs),
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_args() {
        let cli = Cli::parse_from(["runscribe", "-vv", "replay", "events.jsonl", "--run-folder", "r1"]);
        assert_eq!(cli.verbosity(), 2);
        match cli.command {
            Commands::Replay(args) => {
                assert_eq!(args.events, PathBuf::from("events.jsonl"));
                assert_eq!(args.run_folder.as_deref(), Some("r1"));
            }
            _ => panic!("expected replay"),
        }
    }

    #[test]
    fn test_global_folder_after_subcommand() {
        let cli = Cli::parse_from(["runscribe", "config", "--folder", "/tmp/reports"]);
        assert_eq!(cli.folder, Some(PathBuf::from("/tmp/reports")));
        assert!(matches!(cli.command, Commands::Config(_)));
    }

    #[test]
    fn test_verbosity_capped() {
        let cli = Cli::parse_from(["runscribe", "-vvvvv", "config"]);
        assert_eq!(cli.verbosity(), 3);
    }
}
