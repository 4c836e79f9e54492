//! Command dispatch and bootstrap for the nodectl command line.
//!
//! A command name selects a `run_<name>` handler from a [`dispatch::CommandRegistry`];
//! bootstrapped handlers load configuration and install logging before their
//! body runs.

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod convert;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod prompt;

pub use bootstrap::{Bootstrap, CommandContext};
pub use dispatch::{start, CliParser, CommandRegistry, Dispatched, Multiprocess, ParsedArgs};
pub use error::{CommandError, ConfigError};
