//! Logging configuration derived from process settings, installed on `tracing`.

mod format;

use std::{
    collections::BTreeMap,
    fmt,
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt as tfmt, prelude::*, EnvFilter};

use crate::{
    config::{LogSection, Settings, DEFAULT_DATEFMT, DEFAULT_FMT},
    error::CommandError,
};

pub use format::{level_name, TemplateFormat};

/// Severity names accepted on the command line and in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub const NAMES: [&'static str; 5] = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }

    /// `tracing` has no level above ERROR, so CRITICAL shares its threshold.
    pub fn filter(self) -> LevelFilter {
        match self {
            Self::Debug => LevelFilter::DEBUG,
            Self::Info => LevelFilter::INFO,
            Self::Warning => LevelFilter::WARN,
            Self::Error | Self::Critical => LevelFilter::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = CommandError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_uppercase().as_str() {
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARNING" | "WARN" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            "CRITICAL" => Ok(Self::Critical),
            _ => Err(CommandError::invalid_value(
                raw,
                format!("expected one of {}", Self::NAMES.join(", ")),
            )),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sink and the lowest severity it accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerConfig {
    pub level: LogLevel,
    /// Destination file; `None` writes to stderr.
    pub filename: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatterConfig {
    pub format: String,
    pub datefmt: String,
}

/// Handlers and formatters applied to the process logger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub console: HandlerConfig,
    pub file: HandlerConfig,
    pub errors: HandlerConfig,
    pub console_format: FormatterConfig,
    pub file_format: FormatterConfig,
    pub granular_levels: BTreeMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let formatter = FormatterConfig {
            format: DEFAULT_FMT.to_string(),
            datefmt: DEFAULT_DATEFMT.to_string(),
        };
        Self {
            console: HandlerConfig {
                level: LogLevel::Info,
                filename: None,
            },
            file: HandlerConfig {
                level: LogLevel::Info,
                filename: Some(home.join("nodectl.log")),
            },
            errors: HandlerConfig {
                level: LogLevel::Error,
                filename: Some(home.join("nodectl-errors.log")),
            },
            console_format: formatter.clone(),
            file_format: formatter,
            granular_levels: BTreeMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Derive the logging configuration from loaded settings.
    ///
    /// Worker processes call this again from their own settings instead of
    /// sharing the parent's handlers.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let log = settings.log()?;
        Ok(Self::default().with_section(&log)?)
    }

    /// Overwrite destinations, thresholds and formats from a `log` section.
    pub fn with_section(mut self, log: &LogSection) -> Result<Self, CommandError> {
        self.file.filename = Some(log.file.clone());
        self.errors.filename = Some(log.error_file.clone());

        self.console.level = log.level_console.parse()?;
        self.file.level = log.level_logfile.parse()?;

        self.console_format.datefmt = log.datefmt_console.clone();
        self.file_format.datefmt = log.datefmt_logfile.clone();

        // Both formatters use the console message format; `fmt_logfile` is not read.
        self.console_format.format = log.fmt_console.clone();
        self.file_format.format = log.fmt_console.clone();

        self.granular_levels = log
            .granular_levels
            .iter()
            .map(|(target, level)| Ok((target.clone(), level.parse()?)))
            .collect::<Result<_, CommandError>>()?;
        Ok(self)
    }

    fn filter_for(&self, level: LogLevel, granular: bool) -> Result<EnvFilter, CommandError> {
        let mut directives = level.filter().to_string();
        if granular {
            for (target, level) in &self.granular_levels {
                directives.push_str(&format!(",{target}={}", level.filter()));
            }
        }
        EnvFilter::try_new(&directives).map_err(|e| CommandError::Logging(e.to_string()))
    }
}

/// Applies a [`LoggingConfig`] as process-wide logging state.
pub trait LogInstaller {
    fn install(&self, config: &LoggingConfig) -> Result<(), CommandError>;
}

/// Installs the global `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingInstaller;

impl LogInstaller for TracingInstaller {
    fn install(&self, config: &LoggingConfig) -> Result<(), CommandError> {
        install(config).map(|_| ())
    }
}

/// Install the global subscriber; returns `false` when one was already set.
pub fn install(config: &LoggingConfig) -> Result<bool, CommandError> {
    if tracing::dispatcher::has_been_set() {
        return Ok(false);
    }

    let console = tfmt::layer()
        .with_writer(io::stderr)
        .event_format(TemplateFormat::new(
            &config.console_format.format,
            &config.console_format.datefmt,
        )?)
        .with_filter(config.filter_for(config.console.level, true)?);

    let file_format = TemplateFormat::new(&config.file_format.format, &config.file_format.datefmt)?;
    let file = match &config.file.filename {
        Some(path) => Some(
            tfmt::layer()
                .with_ansi(false)
                .with_writer(open_append(path)?)
                .event_format(file_format.clone())
                .with_filter(config.filter_for(config.file.level, true)?),
        ),
        None => None,
    };
    let errors = match &config.errors.filename {
        Some(path) => Some(
            tfmt::layer()
                .with_ansi(false)
                .with_writer(open_append(path)?)
                .event_format(file_format)
                .with_filter(config.filter_for(config.errors.level, false)?),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .with(errors)
        .try_init()
        .map_err(|e| CommandError::Logging(e.to_string()))?;

    tracing::debug!(console = %config.console.level, file = %config.file.level, "logging installed");
    Ok(true)
}

fn open_append(path: &Path) -> Result<Arc<File>, CommandError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| CommandError::Logging(format!("{}: {e}", parent.display())))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(Arc::new)
        .map_err(|e| CommandError::Logging(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn section() -> LogSection {
        serde_json::from_value(json!({
            "file": "/var/log/node/node.log",
            "error_file": "/var/log/node/errors.log",
            "level_console": "warning",
            "level_logfile": "debug",
            "datefmt_console": "%H:%M:%S",
            "datefmt_logfile": "%Y-%m-%dT%H:%M:%S",
            "fmt_console": "{levelname} {message}",
            "fmt_logfile": "never used",
            "granular_levels": {"nodectl::config": "error"},
        }))
        .unwrap()
    }

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!("critical".parse::<LogLevel>().unwrap(), LogLevel::Critical);
        assert_eq!("Warning".parse::<LogLevel>().unwrap().to_string(), "WARNING");
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn section_overwrites_defaults() {
        let config = LoggingConfig::default().with_section(&section()).unwrap();
        assert_eq!(config.console.level, LogLevel::Warning);
        assert_eq!(config.file.level, LogLevel::Debug);
        assert_eq!(config.errors.level, LogLevel::Error);
        assert_eq!(config.file.filename.as_deref(), Some(Path::new("/var/log/node/node.log")));
        assert_eq!(
            config.errors.filename.as_deref(),
            Some(Path::new("/var/log/node/errors.log"))
        );
        assert_eq!(config.console_format.datefmt, "%H:%M:%S");
        assert_eq!(config.file_format.datefmt, "%Y-%m-%dT%H:%M:%S");
        assert_eq!(config.granular_levels["nodectl::config"], LogLevel::Error);
    }

    #[test]
    fn file_formatter_reuses_console_format() {
        let config = LoggingConfig::default().with_section(&section()).unwrap();
        assert_eq!(config.file_format.format, "{levelname} {message}");
        assert_eq!(config.console_format.format, config.file_format.format);
    }

    #[test]
    fn invalid_level_in_section_is_rejected() {
        let mut log = section();
        log.level_logfile = "loud".into();
        assert!(matches!(
            LoggingConfig::default().with_section(&log),
            Err(CommandError::InvalidValue { value, .. }) if value == "loud"
        ));
    }

    #[test]
    fn granular_levels_become_directives() {
        let config = LoggingConfig::default().with_section(&section()).unwrap();
        let filter = config.filter_for(LogLevel::Info, true).unwrap();
        let rendered = filter.to_string().to_lowercase();
        assert!(rendered.contains("nodectl::config=error"), "{rendered}");
    }
}
