//! CLI entry-point for printing the merged configuration.

use anyhow::Result;
use clap::Command;
use tracing::instrument;

use crate::bootstrap::CommandContext;

pub fn command() -> Command {
    Command::new("show-config").about("Show the current configuration")
}

#[instrument(skip_all)]
pub fn run(ctx: CommandContext) -> Result<()> {
    println!("{}", ctx.settings.to_json_pretty());
    Ok(())
}
