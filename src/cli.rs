use std::path::PathBuf;
use clap::{Parser, ValueEnum};

use crate::config::{default_config_path, FwatchConfig};
use crate::events::{Disposition, MoveRecord};

#[derive(Parser)]
#[command(name = "fwatch")]
#[command(version)]
#[command(about = "Watch a directory and move new files into folders by extension")]
#[command(long_about = "fwatch watches a directory for new or modified files and moves each one into the destination configured for its extension. Name clashes get a timestamp suffix, and moves across filesystems fall back to copy and delete.")]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "PATH", help = "Path to configuration file (defaults to $XDG_CONFIG_HOME/fwatch/config.toml)")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    /// Output format for move records
    #[arg(long, default_value = "text", help = "Output format")]
    pub output: OutputFormat,

    /// Override the configured debounce
    #[arg(long, value_name = "MS", help = "Delay in ms before a changed file is inspected")]
    pub debounce_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Log lines only (default)
    Text,
    /// One JSON object per move on stdout
    Json,
}

impl Cli {
    pub fn get_config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(default_config_path)
    }

    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply_overrides(&self, config: &mut FwatchConfig) {
        if let Some(ms) = self.debounce_ms {
            config.pipeline.debounce_ms = ms;
        }
    }

    pub fn setup_logging(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };

        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(path) = &self.config {
            if !path.is_file() {
                return Err(format!("Config file does not exist: {}", path.display()));
            }
        }

        Ok(())
    }

    /// Render a pipeline outcome for stdout, if this format prints it
    pub fn render(&self, disposition: &Disposition) -> Option<String> {
        match (self.output, disposition) {
            (OutputFormat::Json, Disposition::Moved(record)) => render_json(record),
            _ => None,
        }
    }
}

fn render_json(record: &MoveRecord) -> Option<String> {
    match serde_json::to_string(record) {
        Ok(line) => Some(line),
        Err(err) => {
            tracing::warn!("Failed to serialize move record: {}", err);
            None
        }
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: None,
            verbose: false,
            output: OutputFormat::Text,
            debounce_ms: None,
        }
    }
}
