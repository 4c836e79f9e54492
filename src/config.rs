//! Process configuration for nodectl.
//!
//! A configuration is a JSON object tree merged from, in order: built-in
//! defaults, a JSON file, `NODECTL_*` environment variables and command-line
//! overrides. Every load starts again from the defaults.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};
use crate::{
    convert::{self, Value},
    error::ConfigError,
};

/// Prefix of environment variables overriding configuration leaves.
pub const ENV_PREFIX: &str = "NODECTL";
/// `--config` value meaning "load, but never read or write a file".
pub const NO_FILE: &str = "-";

const DEFAULT_FILE_NAME: &str = ".nodectl";
pub(crate) const DEFAULT_DATEFMT: &str = "%Y-%m-%d %H:%M:%S";
pub(crate) const DEFAULT_FMT: &str = "[{asctime}] [{levelname}] ({name}) {message} (pid: {process})";

/// Merged process-wide configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    tree: Map<String, JsonValue>,
    persistent: bool,
    /// Default file that was looked for and not found.
    missing_default: Option<PathBuf>,
}

/// Typed view of the `log` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogSection {
    pub file: PathBuf,
    pub error_file: PathBuf,
    pub level_console: String,
    pub level_logfile: String,
    pub datefmt_console: String,
    pub datefmt_logfile: String,
    pub fmt_console: String,
    pub fmt_logfile: String,
    #[serde(default)]
    pub granular_levels: BTreeMap<String, String>,
}

impl Settings {
    /// Load configuration from defaults, `path`, the environment and `overrides`.
    pub fn load(
        path: Option<&str>,
        overrides: Option<Map<String, JsonValue>>,
    ) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::load_with(path, overrides, |name| std::env::var(name).ok(), default_path)
    }

    pub(crate) fn load_with<FEnv, FPath>(
        path: Option<&str>,
        overrides: Option<Map<String, JsonValue>>,
        env_lookup: FEnv,
        default_path: FPath,
    ) -> Result<Self, ConfigError>
    where
        FEnv: Fn(&str) -> Option<String>,
        FPath: Fn() -> PathBuf,
    {
        let mut tree = defaults();
        let persistent = path != Some(NO_FILE);
        let mut missing_default = None;

        match path {
            Some(NO_FILE) => {}
            Some(explicit) => merge(&mut tree, read_file(Path::new(explicit))?),
            None => {
                let fallback = default_path();
                if fallback.exists() {
                    merge(&mut tree, read_file(&fallback)?);
                } else {
                    missing_default = Some(fallback);
                }
            }
        }

        apply_env(&mut tree, &env_lookup)?;

        if let Some(overrides) = overrides {
            merge(&mut tree, overrides);
        }

        Ok(Self {
            tree,
            persistent,
            missing_default,
        })
    }

    /// Settings built from the defaults alone.
    pub fn defaults() -> Self {
        Self {
            tree: defaults(),
            persistent: true,
            missing_default: None,
        }
    }

    /// False when loaded with `--config -`.
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Default file skipped because it does not exist.
    ///
    /// Loading runs before logging is installed, so the warning is left to
    /// the caller.
    pub fn missing_default(&self) -> Option<&Path> {
        self.missing_default.as_deref()
    }

    /// Look up a dotted path such as `log.level_console`.
    pub fn get(&self, dotted: &str) -> Option<&JsonValue> {
        let mut parts = dotted.split('.');
        let mut current = self.tree.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Replace the leaf at a dotted path, creating intermediate objects.
    pub fn set(&mut self, dotted: &str, value: impl Into<JsonValue>) {
        let segments: Vec<&str> = dotted.split('.').collect();
        set_path(&mut self.tree, &segments, value.into());
    }

    pub fn as_map(&self) -> &Map<String, JsonValue> {
        &self.tree
    }

    /// Deserialize the `log` section.
    pub fn log(&self) -> Result<LogSection, ConfigError> {
        let section = self
            .tree
            .get("log")
            .cloned()
            .ok_or_else(|| ConfigError::Invalid("missing `log` section".into()))?;
        serde_json::from_value(section)
            .map_err(|e| ConfigError::Invalid(format!("`log` section: {e}")))
    }

    pub fn to_json_pretty(&self) -> String {
        // A map of JSON values always serializes.
        serde_json::to_string_pretty(&self.tree).unwrap_or_default()
    }

    /// Write the configuration as JSON to `target`; `-` prints to stdout.
    pub fn persist(&self, target: &str) -> Result<(), ConfigError> {
        if target == NO_FILE {
            println!("{}", self.to_json_pretty());
            return Ok(());
        }
        let path = PathBuf::from(target);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&path, self.to_json_pretty() + "\n")
            .map_err(|source| ConfigError::Io { path, source })
    }
}

/// `~/.nodectl`, or `./.nodectl` when no home directory is known.
pub fn default_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_FILE_NAME)
}

fn defaults() -> Map<String, JsonValue> {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let tree = json!({
        "server": {
            "bind": "localhost:9984",
            "loglevel": "info",
        },
        "log": {
            "file": home.join("nodectl.log").display().to_string(),
            "error_file": home.join("nodectl-errors.log").display().to_string(),
            "level_console": "info",
            "level_logfile": "info",
            "datefmt_console": DEFAULT_DATEFMT,
            "datefmt_logfile": DEFAULT_DATEFMT,
            "fmt_console": DEFAULT_FMT,
            "fmt_logfile": DEFAULT_FMT,
            "granular_levels": {},
        },
    });
    match tree {
        JsonValue::Object(map) => map,
        _ => Map::new(),
    }
}

fn read_file(path: &Path) -> Result<Map<String, JsonValue>, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed: JsonValue = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    match parsed {
        JsonValue::Object(map) => Ok(map),
        _ => Err(ConfigError::Invalid(format!(
            "{} must contain a JSON object",
            path.display()
        ))),
    }
}

/// Deep-merge `overlay` into `base`; nested objects merge, everything else is replaced.
pub fn merge(base: &mut Map<String, JsonValue>, overlay: Map<String, JsonValue>) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(JsonValue::Object(existing)), JsonValue::Object(incoming)) => {
                merge(existing, incoming)
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn apply_env<F>(tree: &mut Map<String, JsonValue>, env_lookup: &F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut leaves = Vec::new();
    collect_leaves(tree, &mut Vec::new(), &mut leaves);

    for (segments, current) in leaves {
        let name = format!("{ENV_PREFIX}_{}", segments.join("_").to_uppercase());
        let Some(raw) = env_lookup(&name) else {
            continue;
        };
        let converted = convert::convert(&raw, Value::from_json(&current), None)
            .map_err(|e| ConfigError::Invalid(format!("{name}: {e}")))?;
        if let Some(value) = converted {
            let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
            set_path(tree, &segments, value.into());
        }
    }
    Ok(())
}

fn collect_leaves(
    tree: &Map<String, JsonValue>,
    prefix: &mut Vec<String>,
    out: &mut Vec<(Vec<String>, JsonValue)>,
) {
    for (key, value) in tree {
        prefix.push(key.clone());
        match value {
            JsonValue::Object(child) => collect_leaves(child, prefix, out),
            leaf => out.push((prefix.clone(), leaf.clone())),
        }
        prefix.pop();
    }
}

fn set_path(tree: &mut Map<String, JsonValue>, segments: &[&str], value: JsonValue) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut current = tree;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| JsonValue::Object(Map::new()));
        if !entry.is_object() {
            *entry = JsonValue::Object(Map::new());
        }
        let JsonValue::Object(next) = entry else {
            return;
        };
        current = next;
    }
    current.insert(last.to_string(), value);
}
