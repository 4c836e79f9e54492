//! Entry point wiring CLI dispatch to bootstrapped command handlers.

use std::{env, sync::Arc};

use anyhow::Result;
use nodectl::{bootstrap::Bootstrap, cli, dispatch};

fn main() -> Result<()> {
    let parser = cli::parser();
    let registry = cli::registry(Arc::new(Bootstrap::default()));

    match dispatch::start(&parser, env::args_os().skip(1), &registry) {
        Ok(_) => Ok(()),
        Err(err) => match err.downcast::<clap::Error>() {
            Ok(usage) => usage.exit(),
            Err(err) => Err(err),
        },
    }
}
