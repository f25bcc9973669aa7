//! Subcommands module for Runscribe CLI

pub mod replay;
pub mod show_config;

use runscribe::config::Config;

/// Common context shared between commands
pub struct CommandContext {
    /// Effective configuration
    pub config: Config,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &crate::cli::Cli, mut config: Config) -> Self {
        if let Some(folder) = &cli.folder {
            config.recorder.log_folder = folder.clone();
        }
        Self { config }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn test_folder_flag_overrides_config() {
        let cli = Cli::parse_from(["runscribe", "-v", "config", "--folder", "/tmp/reports"]);
        let ctx = CommandContext::new(&cli, Config::default());
        assert_eq!(ctx.config.recorder.log_folder, PathBuf::from("/tmp/reports"));

        let cli = Cli::parse_from(["runscribe", "config"]);
        let ctx = CommandContext::new(&cli, Config::default());
        assert_eq!(ctx.config.recorder.log_folder, Config::default().recorder.log_folder);
    }
}
