//! Failure kinds raised by the dispatch and bootstrap pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while converting input or dispatching a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// A raw string could not be converted to the requested type.
    #[error("invalid value `{value}`: {reason}")]
    InvalidValue { value: String, reason: String },

    /// No handler is registered for the requested command.
    #[error("Command `{0}` not yet implemented")]
    NotImplemented(String),

    /// The derived logging configuration could not be applied.
    #[error("logging setup failed: {0}")]
    Logging(String),
}

impl CommandError {
    pub(crate) fn invalid_value(value: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidValue {
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors raised while loading or persisting process configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
