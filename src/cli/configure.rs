//! CLI entry-point for writing a configuration file interactively.

use std::{
    io::{self, BufRead, Write},
    path::Path,
};

use anyhow::Result;
use clap::Command;
use tracing::instrument;

use crate::{
    config::{self, Settings, NO_FILE},
    convert::{Converter, Value},
    dispatch::ParsedArgs,
    logging::LogLevel,
    prompt,
};

pub fn command() -> Command {
    Command::new("configure").about("Prepare the config file")
}

#[instrument(skip_all)]
pub fn run(args: ParsedArgs) -> Result<()> {
    let stdin = io::stdin();
    let stderr = io::stderr();
    run_with(&args, &mut stdin.lock(), &mut stderr.lock())
}

/// Prompt on `prompts`, read answers from `answers` and persist the result.
pub fn run_with<R, W>(args: &ParsedArgs, answers: &mut R, prompts: &mut W) -> Result<()>
where
    R: BufRead,
    W: Write,
{
    let target = args
        .config
        .clone()
        .unwrap_or_else(|| config::default_path().display().to_string());

    if target != NO_FILE && Path::new(&target).exists() && !args.assume_yes {
        let overwrite = prompt::read_input(
            answers,
            prompts,
            &format!("Config file `{target}` exists, do you want to override it? (cannot be undone) [y/N]: "),
            Some(Value::Bool(false)),
            Some(Converter::Bool),
        )?;
        if overwrite.and_then(|v| v.as_bool()) != Some(true) {
            writeln!(prompts, "Ok, leaving the configuration untouched.")?;
            return Ok(());
        }
    }

    let mut settings = Settings::defaults();
    if !args.assume_yes {
        writeln!(prompts, "Generating default configuration for `{target}`")?;
        writeln!(prompts, "Press enter to keep the default value shown in brackets.")?;
        for (key, converter) in questions() {
            let current = settings.get(key).and_then(Value::from_json);
            let shown = current
                .as_ref()
                .map(|v| serde_json::Value::from(v.clone()).to_string())
                .unwrap_or_default();
            let answer = prompt::read_input(
                answers,
                prompts,
                &format!("{key}? [{shown}]: "),
                current,
                converter,
            )?;
            if let Some(value) = answer {
                settings.set(key, value);
            }
        }
    }

    settings.persist(&target)?;
    if target != NO_FILE {
        writeln!(prompts, "Configuration written to {target}")?;
    }
    Ok(())
}

fn questions() -> Vec<(&'static str, Option<Converter>)> {
    let level = Converter::custom(|raw| {
        let level: LogLevel = raw.parse()?;
        Ok(Value::Str(level.as_str().to_lowercase()))
    });
    vec![
        ("server.bind", None),
        ("log.level_console", Some(level.clone())),
        ("log.level_logfile", Some(level)),
        ("log.file", None),
    ]
}
