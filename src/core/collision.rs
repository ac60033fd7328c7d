use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};

use super::rules::split_extension;
use crate::config::DEFAULT_TIMESTAMP_FORMAT;

/// Source of the current wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Always reports the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Picks a free destination name, timestamping the file on a clash.
///
/// Only one check is made: if the timestamped name is also taken the
/// move will overwrite it. With second resolution this needs two
/// arrivals of the same name within one second.
#[derive(Clone)]
pub struct CollisionResolver {
    clock: Arc<dyn Clock>,
    format: String,
}

impl Default for CollisionResolver {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), DEFAULT_TIMESTAMP_FORMAT)
    }
}

impl std::fmt::Debug for CollisionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollisionResolver")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl CollisionResolver {
    pub fn new(clock: Arc<dyn Clock>, format: impl Into<String>) -> Self {
        Self {
            clock,
            format: format.into(),
        }
    }

    pub fn resolve(&self, candidate: &Path) -> PathBuf {
        if fs::symlink_metadata(candidate).is_err() {
            return candidate.to_path_buf();
        }

        let resolved = self.timestamped(candidate);
        tracing::info!(
            "Destination file exists, using: {}",
            resolved
                .file_name()
                .map(|name| name.to_string_lossy())
                .unwrap_or_default()
        );
        resolved
    }

    /// `dir/name.ext` → `dir/name-<timestamp>.ext`
    pub fn timestamped(&self, candidate: &Path) -> PathBuf {
        let timestamp = self.clock.now().format(&self.format).to_string();

        let (mut name, ext) = split_extension(candidate.file_name().unwrap_or_default());
        name.push("-");
        name.push(&timestamp);
        if let Some(ext) = ext {
            name.push(ext);
        }

        candidate.with_file_name(name)
    }
}
