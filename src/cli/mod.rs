//! Command-line interface wiring for nodectl.

use std::sync::Arc;

use crate::{
    bootstrap::Bootstrap,
    dispatch::{CliParser, CommandRegistry},
};

pub mod configure;
pub mod show_config;
pub mod start;

pub const PROG: &str = "nodectl";

/// Parser with the base flags and every nodectl subcommand.
pub fn parser() -> CliParser {
    CliParser::new(PROG, env!("CARGO_PKG_VERSION"))
        .subcommand(configure::command())
        .subcommand(show_config::command())
        .subcommand(start::command())
}

/// Handlers for every subcommand, bootstrapped where they need configuration.
pub fn registry(bootstrap: Arc<Bootstrap>) -> CommandRegistry {
    let mut registry = CommandRegistry::new();
    registry
        .register("configure", configure::run)
        .register("show-config", bootstrap.wrap(show_config::run))
        .register("start", bootstrap.wrap(start::run));
    registry
}
