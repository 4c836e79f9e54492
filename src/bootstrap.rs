//! Bootstrap pipeline run around every command body.
//!
//! The order is fixed: load configuration, then install logging, then run
//! the body with a [`CommandContext`] holding both.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde_json::{json, Map, Value as JsonValue};
use tracing::{debug, warn};

use crate::{
    config::Settings,
    dispatch::{Handler, ParsedArgs},
    error::ConfigError,
    logging::{LogInstaller, LoggingConfig, TracingInstaller},
};

/// State handed to a command body once bootstrap has finished.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub args: ParsedArgs,
    pub settings: Settings,
    pub logging: LoggingConfig,
}

/// Partially bootstrapped invocation, filled in step by step.
#[derive(Debug)]
pub struct Invocation {
    pub args: ParsedArgs,
    pub settings: Option<Settings>,
    pub logging: Option<LoggingConfig>,
}

impl Invocation {
    fn new(args: ParsedArgs) -> Self {
        Self {
            args,
            settings: None,
            logging: None,
        }
    }

    fn into_context(self) -> Result<CommandContext> {
        let settings = self
            .settings
            .ok_or_else(|| anyhow!("configuration was not loaded"))?;
        let logging = self
            .logging
            .ok_or_else(|| anyhow!("logging was not installed"))?;
        Ok(CommandContext {
            args: self.args,
            settings,
            logging,
        })
    }
}

/// One setup step applied before a command body runs.
pub trait BootstrapStep: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, invocation: &mut Invocation) -> Result<()>;
}

type LoadFn = dyn Fn(Option<&str>, Option<Map<String, JsonValue>>) -> Result<Settings, ConfigError>
    + Send
    + Sync;

/// Loads process configuration, applying `--log-level` on top of every source.
pub struct LoadConfiguration {
    loader: Box<LoadFn>,
}

impl Default for LoadConfiguration {
    fn default() -> Self {
        Self::with_loader(Settings::load)
    }
}

impl LoadConfiguration {
    pub fn with_loader<F>(loader: F) -> Self
    where
        F: Fn(Option<&str>, Option<Map<String, JsonValue>>) -> Result<Settings, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            loader: Box::new(loader),
        }
    }
}

/// Override structure for a command-line log level, if one was given.
pub fn cmdline_overrides(args: &ParsedArgs) -> Option<Map<String, JsonValue>> {
    let level = args.log_level?.to_string();
    let overrides = json!({
        "log": {
            "level_console": level,
            "level_logfile": level,
        },
        "server": {"loglevel": level},
    });
    overrides.as_object().cloned()
}

impl BootstrapStep for LoadConfiguration {
    fn name(&self) -> &'static str {
        "configuration"
    }

    fn apply(&self, invocation: &mut Invocation) -> Result<()> {
        let overrides = cmdline_overrides(&invocation.args);
        let settings = (self.loader)(invocation.args.config.as_deref(), overrides)?;
        invocation.settings = Some(settings);
        Ok(())
    }
}

/// Derives logging from the loaded configuration and installs it.
pub struct InstallLogging {
    installer: Arc<dyn LogInstaller + Send + Sync>,
}

impl Default for InstallLogging {
    fn default() -> Self {
        Self::with_installer(TracingInstaller)
    }
}

impl InstallLogging {
    pub fn with_installer<I>(installer: I) -> Self
    where
        I: LogInstaller + Send + Sync + 'static,
    {
        Self {
            installer: Arc::new(installer),
        }
    }
}

impl BootstrapStep for InstallLogging {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn apply(&self, invocation: &mut Invocation) -> Result<()> {
        let settings = invocation
            .settings
            .as_ref()
            .ok_or_else(|| anyhow!("logging requires configuration to be loaded first"))?;
        let logging = LoggingConfig::from_settings(settings)?;
        self.installer.install(&logging)?;
        if let Some(path) = settings.missing_default() {
            warn!(path = %path.display(), "no configuration file found, using defaults");
        }
        invocation.logging = Some(logging);
        Ok(())
    }
}

/// Configuration step followed by logging step.
pub struct Bootstrap {
    steps: [Box<dyn BootstrapStep>; 2],
}

impl Default for Bootstrap {
    fn default() -> Self {
        Self::new(LoadConfiguration::default(), InstallLogging::default())
    }
}

impl Bootstrap {
    pub fn new(configuration: LoadConfiguration, logging: InstallLogging) -> Self {
        Self {
            steps: [
                Box::new(configuration) as Box<dyn BootstrapStep>,
                Box::new(logging),
            ],
        }
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    /// Run every step and build the context for the command body.
    pub fn run(&self, args: ParsedArgs) -> Result<CommandContext> {
        let mut invocation = Invocation::new(args);
        for step in &self.steps {
            step.apply(&mut invocation)?;
            debug!(step = step.name(), "bootstrap step complete");
        }
        invocation.into_context()
    }

    /// Turn a command body into a dispatchable handler.
    pub fn wrap<T, F>(self: &Arc<Self>, body: F) -> Handler<T>
    where
        F: Fn(CommandContext) -> Result<T> + Send + Sync + 'static,
    {
        let bootstrap = Arc::clone(self);
        Box::new(move |args: ParsedArgs| body(bootstrap.run(args)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::CommandError, logging::LogLevel};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<LoggingConfig>>>);

    impl LogInstaller for Recorder {
        fn install(&self, config: &LoggingConfig) -> Result<(), CommandError> {
            self.0.lock().unwrap().push(config.clone());
            Ok(())
        }
    }

    fn quiet_loader(
        path: Option<&str>,
        overrides: Option<Map<String, JsonValue>>,
    ) -> Result<Settings, ConfigError> {
        Settings::load_with(path, overrides, |_| None, || "/nonexistent/.nodectl".into())
    }

    #[test]
    fn steps_run_in_fixed_order() {
        let bootstrap = Bootstrap::new(
            LoadConfiguration::with_loader(quiet_loader),
            InstallLogging::with_installer(Recorder::default()),
        );
        assert_eq!(bootstrap.step_names(), ["configuration", "logging"]);
    }

    #[test]
    fn log_level_flag_builds_overrides() {
        let mut args = ParsedArgs::for_command("start");
        assert!(cmdline_overrides(&args).is_none());

        args.log_level = Some(LogLevel::Error);
        let overrides = JsonValue::Object(cmdline_overrides(&args).unwrap());
        assert_eq!(
            overrides,
            json!({
                "log": {"level_console": "ERROR", "level_logfile": "ERROR"},
                "server": {"loglevel": "ERROR"},
            })
        );
    }

    #[test]
    fn logging_step_refuses_to_run_first() {
        let mut invocation = Invocation::new(ParsedArgs::for_command("start"));
        let step = InstallLogging::with_installer(Recorder::default());
        assert!(step.apply(&mut invocation).is_err());
    }

    #[test]
    fn loader_failure_passes_through() {
        let bootstrap = Arc::new(Bootstrap::new(
            LoadConfiguration::with_loader(|_, _| Err(ConfigError::Invalid("broken".into()))),
            InstallLogging::with_installer(Recorder::default()),
        ));
        let handler = bootstrap.wrap(|_| -> Result<()> { panic!("body must not run") });
        let err = handler(ParsedArgs::for_command("start")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Invalid(msg)) if msg == "broken"
        ));
    }
}
