//! Config command: prints the effective configuration.

use anyhow::{bail, Result};
use clap::Parser;

use super::CommandContext;

/// Arguments for the config command
#[derive(Parser, Debug, Clone)]
pub struct ConfigArgs {
    /// Print a single value by dotted key (e.g. `recorder.log_folder`)
    #[arg(long)]
    pub key: Option<String>,
}

impl ConfigArgs {
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        match &self.key {
            Some(key) => match ctx.config.get(key) {
                Some(value) => println!("{}", value),
                None => bail!("Unknown configuration key: {}", key),
            },
            None => print!("{}", ctx.config.to_toml()?),
        }
        Ok(0)
    }
}
