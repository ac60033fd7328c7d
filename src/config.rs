//! Configuration management for fwatch
//!
//! The configuration is a TOML document naming the directory to watch, the
//! routing rules, and the tunables of the event pipeline.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};

/// Default debounce before a changed file is inspected
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Default collision suffix format, sortable at second resolution
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Top-level configuration for fwatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FwatchConfig {
    /// Directory whose direct children are routed
    pub watch_dir: PathBuf,
    /// Create every rule destination before watching starts
    #[serde(default)]
    pub create_dirs: bool,
    /// Routing rules, in registration order
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Event pipeline tunables
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// A set of extensions routed to one destination directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Extensions including the leading dot, e.g. ".zip"
    pub extensions: Vec<String>,
    pub destination: PathBuf,
}

/// Configuration for the event pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Delay in milliseconds before a changed file is inspected
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// strftime format inserted into colliding file names
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_timestamp_format() -> String {
    DEFAULT_TIMESTAMP_FORMAT.to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Get debounce duration
    pub fn debounce_duration(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Rule {
    pub fn new<I, S, P>(extensions: I, destination: P) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        P: Into<PathBuf>,
    {
        Self {
            extensions: extensions.into_iter().map(Into::into).collect(),
            destination: destination.into(),
        }
    }
}

/// Resolve the default configuration file location.
///
/// Checks `$XDG_CONFIG_HOME/fwatch/config.toml` first, then
/// `$HOME/.config/fwatch/config.toml`, and finally `config.toml` in the
/// working directory.
pub fn default_config_path() -> PathBuf {
    config_path_from(
        std::env::var_os("XDG_CONFIG_HOME"),
        std::env::var_os("HOME"),
    )
}

fn config_path_from(
    xdg_config_home: Option<std::ffi::OsString>,
    home: Option<std::ffi::OsString>,
) -> PathBuf {
    if let Some(dir) = xdg_config_home.filter(|d| !d.is_empty()) {
        return PathBuf::from(dir).join("fwatch").join("config.toml");
    }
    if let Some(home) = home.filter(|h| !h.is_empty()) {
        return PathBuf::from(home)
            .join(".config")
            .join("fwatch")
            .join("config.toml");
    }
    PathBuf::from("config.toml")
}

impl FwatchConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config = toml::from_str(contents)?;
        Ok(config)
    }

    /// Override fields with environment variables if present
    pub fn apply_env_overrides(&mut self) {
        if let Some(dir) = std::env::var_os("FWATCH_WATCH_DIR") {
            if !dir.is_empty() {
                self.watch_dir = PathBuf::from(dir);
            }
        }

        if let Ok(val) = std::env::var("FWATCH_DEBOUNCE_MS") {
            match val.parse::<u64>() {
                Ok(ms) => self.pipeline.debounce_ms = ms,
                Err(_) => tracing::warn!("Ignoring invalid FWATCH_DEBOUNCE_MS: {}", val),
            }
        }

        if let Ok(val) = std::env::var("FWATCH_CREATE_DIRS") {
            match val.parse::<bool>() {
                Ok(flag) => self.create_dirs = flag,
                Err(_) => tracing::warn!("Ignoring invalid FWATCH_CREATE_DIRS: {}", val),
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.watch_dir.as_os_str().is_empty() {
            return Err("watch_dir must not be empty".to_string());
        }

        for (i, rule) in self.rules.iter().enumerate() {
            if rule.destination.as_os_str().is_empty() {
                return Err(format!("rule {} has an empty destination", i + 1));
            }
            if rule.extensions.iter().all(|ext| ext.trim().is_empty()) {
                return Err(format!(
                    "rule {} ({}) lists no extensions",
                    i + 1,
                    rule.destination.display()
                ));
            }
        }

        validate_timestamp_format(&self.pipeline.timestamp_format)
    }

    /// Create every rule destination directory.
    ///
    /// Failures are logged and returned; they never abort start-up.
    pub fn ensure_destination_dirs(&self) -> Vec<(PathBuf, std::io::Error)> {
        let mut failures = Vec::new();
        for rule in &self.rules {
            if let Err(err) = fs::create_dir_all(&rule.destination) {
                tracing::warn!(
                    "Failed to create directory {}: {}",
                    rule.destination.display(),
                    err
                );
                failures.push((rule.destination.clone(), err));
            }
        }
        failures
    }
}

fn validate_timestamp_format(format: &str) -> Result<(), String> {
    if format.is_empty() {
        return Err("timestamp_format must not be empty".to_string());
    }
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(format!("timestamp_format '{}' is not a valid strftime format", format));
    }
    if format.contains('/') || format.contains('\\') {
        return Err(format!(
            "timestamp_format '{}' must not produce path separators",
            format
        ));
    }
    Ok(())
}
