//! Subcommand dispatch: base flags, handler registry and `start`.

use std::{
    ffi::OsString,
    io::{self, Write},
    num::NonZeroUsize,
};

use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Args as ClapArgs, Command, FromArgMatches};
use indexmap::IndexMap;

use crate::{error::CommandError, logging::LogLevel};

/// Flags shared by every subcommand.
#[derive(Debug, Clone, Default, PartialEq, Eq, ClapArgs)]
pub struct BaseArgs {
    /// Specify the location of the configuration file (use "-" for stdout)
    #[arg(short, long, global = true)]
    pub config: Option<String>,
    /// Log level
    #[arg(short, long, global = true, value_parser = parse_log_level)]
    pub log_level: Option<LogLevel>,
    /// Assume "yes" as answer to all prompts and run non-interactively
    #[arg(short = 'y', long = "yes", visible_alias = "yes-please", global = true)]
    pub assume_yes: bool,
}

/// Only the exact level names are accepted here, in any case.
fn parse_log_level(raw: &str) -> Result<LogLevel, String> {
    let upper = raw.to_uppercase();
    if !LogLevel::NAMES.contains(&upper.as_str()) {
        return Err(format!(
            "invalid choice `{raw}` (choose from {})",
            LogLevel::NAMES.join(", ")
        ));
    }
    upper.parse().map_err(|e: CommandError| e.to_string())
}

/// Requested worker parallelism before and after normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Multiprocess {
    /// Flag not given.
    #[default]
    Absent,
    /// Flag given without a count: use every available core.
    Auto,
    Workers(NonZeroUsize),
}

impl Multiprocess {
    /// Absent becomes one worker, auto becomes `available()` workers.
    pub fn normalize<F>(self, available: F) -> Self
    where
        F: FnOnce() -> usize,
    {
        match self {
            Self::Absent => Self::Workers(NonZeroUsize::MIN),
            Self::Auto => Self::Workers(NonZeroUsize::new(available()).unwrap_or(NonZeroUsize::MIN)),
            explicit => explicit,
        }
    }

    /// Worker count once normalized.
    pub fn workers(self) -> Option<usize> {
        match self {
            Self::Workers(n) => Some(n.get()),
            _ => None,
        }
    }
}

/// Value parser for `--multiprocess [N|auto]`.
pub fn parse_multiprocess(raw: &str) -> Result<Multiprocess, String> {
    if raw.eq_ignore_ascii_case("auto") {
        return Ok(Multiprocess::Auto);
    }
    raw.parse::<NonZeroUsize>()
        .map(Multiprocess::Workers)
        .map_err(|_| format!("expected a positive worker count or `auto`, got `{raw}`"))
}

/// The `--multiprocess` flag for subcommands that can fan out.
pub fn multiprocess_arg() -> Arg {
    Arg::new("multiprocess")
        .long("multiprocess")
        .num_args(0..=1)
        .default_missing_value("auto")
        .value_name("N")
        .value_parser(parse_multiprocess)
        .help("Spawn N worker processes; without N, one per available core")
}

/// Host processing units, falling back to one.
pub fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Arguments handed to a command handler.
#[derive(Debug, Clone, Default)]
pub struct ParsedArgs {
    pub command: Option<String>,
    pub config: Option<String>,
    pub log_level: Option<LogLevel>,
    pub assume_yes: bool,
    pub multiprocess: Multiprocess,
    /// Matches of the selected subcommand, for handler-specific flags.
    pub matches: ArgMatches,
}

impl ParsedArgs {
    pub fn for_command(command: &str) -> Self {
        Self {
            command: Some(command.to_string()),
            ..Self::default()
        }
    }
}

/// Argument parser with the base flags and any registered subcommands.
#[derive(Debug, Clone)]
pub struct CliParser {
    command: Command,
}

impl CliParser {
    pub fn new(prog: &'static str, version: &'static str) -> Self {
        let command = Command::new(prog)
            .version(version)
            .disable_version_flag(true)
            .allow_external_subcommands(true)
            .arg(
                Arg::new("version")
                    .short('v')
                    .long("version")
                    .action(ArgAction::Version)
                    .help("Print version"),
            );
        Self {
            command: BaseArgs::augment_args(command),
        }
    }

    pub fn subcommand(mut self, subcommand: Command) -> Self {
        self.command = self.command.subcommand(subcommand);
        self
    }

    /// Parse `argv`, which excludes the program name.
    pub fn parse_from<I, S>(&self, argv: I) -> Result<ParsedArgs, clap::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString> + Clone,
    {
        let prog = OsString::from(self.command.get_name());
        let args = std::iter::once(prog).chain(argv.into_iter().map(Into::into));
        let matches = self.command.clone().try_get_matches_from(args)?;
        let base = BaseArgs::from_arg_matches(&matches)?;

        let (command, sub_matches) = match matches.subcommand() {
            Some((name, sub)) => (Some(name.to_string()), sub.clone()),
            None => (None, matches.clone()),
        };
        let multiprocess = match sub_matches.try_get_one::<Multiprocess>("multiprocess") {
            Ok(Some(hint)) => *hint,
            _ => Multiprocess::Absent,
        };

        Ok(ParsedArgs {
            command,
            config: base.config,
            log_level: base.log_level,
            assume_yes: base.assume_yes,
            multiprocess,
            matches: sub_matches,
        })
    }

    pub fn render_help(&self) -> String {
        self.command.clone().render_help().to_string()
    }
}

/// A command handler invoked with the parsed arguments.
pub type Handler<T> = Box<dyn Fn(ParsedArgs) -> Result<T> + Send + Sync>;

/// Registry key for a command name: `foo-bar` becomes `run_foo_bar`.
pub fn handler_key(command: &str) -> String {
    format!("run_{}", command.replace('-', "_"))
}

/// Handlers keyed by `run_<command>` names, in registration order.
pub struct CommandRegistry<T = ()> {
    handlers: IndexMap<String, Handler<T>>,
}

impl<T> Default for CommandRegistry<T> {
    fn default() -> Self {
        Self {
            handlers: IndexMap::new(),
        }
    }
}

impl<T> CommandRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under an explicit key such as `run_start`.
    pub fn insert<F>(&mut self, key: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(ParsedArgs) -> Result<T> + Send + Sync + 'static,
    {
        self.handlers.insert(key.into(), Box::new(handler));
        self
    }

    /// Register under the key derived from a command name.
    pub fn register<F>(&mut self, command: &str, handler: F) -> &mut Self
    where
        F: Fn(ParsedArgs) -> Result<T> + Send + Sync + 'static,
    {
        self.insert(handler_key(command), handler)
    }

    pub fn get(&self, key: &str) -> Option<&Handler<T>> {
        self.handlers.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

/// Outcome of a dispatch that did not fail.
#[derive(Debug, PartialEq, Eq)]
pub enum Dispatched<T> {
    /// No command was given; help was printed.
    HelpShown,
    Completed(T),
}

/// Parse `argv`, resolve `run_<command>` in `scope` and invoke it.
pub fn start<T, I, S>(parser: &CliParser, argv: I, scope: &CommandRegistry<T>) -> Result<Dispatched<T>>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    start_with(parser, argv, scope, &mut io::stdout(), available_cpus)
}

/// [`start`] with an explicit help sink and core count.
pub fn start_with<T, I, S, W, F>(
    parser: &CliParser,
    argv: I,
    scope: &CommandRegistry<T>,
    out: &mut W,
    available: F,
) -> Result<Dispatched<T>>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
    W: Write,
    F: FnOnce() -> usize,
{
    let mut args = parser.parse_from(argv)?;

    let Some(command) = args.command.as_deref() else {
        write!(out, "{}", parser.render_help())?;
        out.flush()?;
        return Ok(Dispatched::HelpShown);
    };

    let handler = scope
        .get(&handler_key(command))
        .ok_or_else(|| CommandError::NotImplemented(command.to_string()))?;

    args.multiprocess = args.multiprocess.normalize(available);
    handler(args).map(Dispatched::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    fn parser() -> CliParser {
        CliParser::new("nodectl", "0.0.0")
            .subcommand(Command::new("start").arg(multiprocess_arg()))
            .subcommand(Command::new("foo-bar"))
    }

    fn workers_registry() -> CommandRegistry<Option<usize>> {
        let mut registry = CommandRegistry::new();
        registry.insert("run_start", |args: ParsedArgs| Ok(args.multiprocess.workers()));
        registry
    }

    #[test]
    fn handler_key_replaces_dashes() {
        assert_eq!(handler_key("foo-bar-baz"), "run_foo_bar_baz");
        assert_eq!(handler_key("start"), "run_start");
    }

    #[test]
    fn dashed_command_reaches_underscored_handler_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let mut registry = CommandRegistry::new();
        registry.insert("run_foo_bar", move |args: ParsedArgs| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(args.command)
        });

        let got = start_with(&parser(), ["foo-bar"], &registry, &mut io::sink(), || 4).unwrap();
        assert_eq!(got, Dispatched::Completed(Some("foo-bar".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregistered_command_is_not_implemented() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let mut registry = CommandRegistry::<()>::new();
        registry.register("start", move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let err = start_with(&parser(), ["foo-bar"], &registry, &mut io::sink(), || 4).unwrap_err();
        match err.downcast_ref::<CommandError>() {
            Some(CommandError::NotImplemented(name)) => assert_eq!(name, "foo-bar"),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unknown_subcommand_is_not_implemented() {
        let err = start_with(&parser(), ["frobnicate"], &workers_registry(), &mut io::sink(), || 4)
            .unwrap_err();
        assert!(err.to_string().contains("frobnicate"));
    }

    #[test]
    fn no_command_prints_help_without_dispatch() {
        let mut out = Vec::new();
        let got = start_with(&parser(), Vec::<String>::new(), &workers_registry(), &mut out, || 4)
            .unwrap();
        assert_eq!(got, Dispatched::HelpShown);
        let help = String::from_utf8(out).unwrap();
        assert!(help.contains("Usage"), "{help}");
        assert!(help.contains("--log-level"), "{help}");
    }

    #[test]
    fn multiprocess_is_normalized() {
        let registry = workers_registry();
        let run = |argv: &[&str]| {
            start_with(&parser(), argv.iter().copied(), &registry, &mut io::sink(), || 6).unwrap()
        };
        assert_eq!(run(&["start"]), Dispatched::Completed(Some(1)));
        assert_eq!(run(&["start", "--multiprocess"]), Dispatched::Completed(Some(6)));
        assert_eq!(run(&["start", "--multiprocess", "3"]), Dispatched::Completed(Some(3)));
        assert_eq!(run(&["start", "--multiprocess", "auto"]), Dispatched::Completed(Some(6)));
    }

    #[test]
    fn multiprocess_rejects_zero() {
        assert!(parser().parse_from(["start", "--multiprocess", "0"]).is_err());
    }

    #[test]
    fn base_flags_parse_anywhere() {
        let args = parser()
            .parse_from(["-c", "/tmp/node.json", "start", "--log-level", "warning", "--yes-please"])
            .unwrap();
        assert_eq!(args.command.as_deref(), Some("start"));
        assert_eq!(args.config.as_deref(), Some("/tmp/node.json"));
        assert_eq!(args.log_level, Some(LogLevel::Warning));
        assert!(args.assume_yes);
        assert_eq!(args.multiprocess, Multiprocess::Absent);
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        assert!(parser().parse_from(["-l", "chatty", "start"]).is_err());
    }

    #[test]
    fn log_level_flag_takes_exact_names_only() {
        assert_eq!(
            parser().parse_from(["-l", "critical", "start"]).unwrap().log_level,
            Some(LogLevel::Critical)
        );
        for raw in ["warn", " debug ", "DEBUG\n"] {
            assert!(parser().parse_from(["-l", raw, "start"]).is_err(), "{raw:?}");
        }
    }

    #[test]
    fn yes_please_is_listed_in_help() {
        let help = parser().render_help();
        assert!(help.contains("yes-please"), "{help}");
    }

    #[test]
    fn version_flag_short_circuits() {
        let err = parser().parse_from(["-v"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn auto_with_no_cores_still_runs_one_worker() {
        assert_eq!(Multiprocess::Auto.normalize(|| 0).workers(), Some(1));
        assert!(available_cpus() > 0);
    }
}
