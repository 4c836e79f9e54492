//! CLI entry-point for starting the node.

use anyhow::Result;
use clap::Command;
use tracing::{info, instrument};

use crate::{bootstrap::CommandContext, dispatch::multiprocess_arg};

pub fn command() -> Command {
    Command::new("start")
        .about("Start the node")
        .arg(multiprocess_arg())
}

#[instrument(skip_all)]
pub fn run(ctx: CommandContext) -> Result<()> {
    let bind = ctx
        .settings
        .get("server.bind")
        .and_then(|v| v.as_str())
        .unwrap_or("localhost:9984");
    let workers = ctx.args.multiprocess.workers().unwrap_or(1);

    info!(%bind, workers, "starting node");
    if !ctx.settings.is_persistent() {
        info!("configuration loaded without a file; changes will not be saved");
    }
    Ok(())
}
