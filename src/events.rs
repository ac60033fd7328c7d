use std::path::PathBuf;

use chrono::{DateTime, Local};
use notify::event::{EventKind, ModifyKind, RenameMode};
use serde::{Deserialize, Serialize};

use crate::core::mover::MoveError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchEventKind {
    Created,
    Modified,
    Renamed,
    Removed,
    Other,
}

impl WatchEventKind {
    /// Only creations and writes can hand us a new file to route
    pub fn is_actionable(self) -> bool {
        matches!(self, WatchEventKind::Created | WatchEventKind::Modified)
    }
}

impl From<&EventKind> for WatchEventKind {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => WatchEventKind::Created,
            // A file moved into the directory is a new arrival
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => WatchEventKind::Created,
            EventKind::Modify(ModifyKind::Name(_)) => WatchEventKind::Renamed,
            // chmod, chown and touch do not hand us new content
            EventKind::Modify(ModifyKind::Metadata(_)) => WatchEventKind::Other,
            // Backends that cannot tell the change apart report writes as Any
            EventKind::Modify(_) => WatchEventKind::Modified,
            EventKind::Remove(_) => WatchEventKind::Removed,
            _ => WatchEventKind::Other,
        }
    }
}

/// A single-path notification from the watched directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: WatchEventKind,
}

impl WatchEvent {
    pub fn new(path: impl Into<PathBuf>, kind: WatchEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::new(path, WatchEventKind::Created)
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(path, WatchEventKind::Modified)
    }

    /// Split a notify event into one event per affected path
    pub fn from_notify(event: notify::Event) -> Vec<Self> {
        let kind = WatchEventKind::from(&event.kind);
        event
            .paths
            .into_iter()
            .map(|path| Self::new(path, kind))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveMethod {
    /// Atomic rename on the same filesystem
    Renamed,
    /// Copy, sync and delete across filesystems
    Copied,
}

/// A completed relocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveRecord {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub method: MoveMethod,
    pub timestamp: DateTime<Local>,
}

impl MoveRecord {
    pub fn new(source: PathBuf, destination: PathBuf, method: MoveMethod) -> Self {
        Self {
            source,
            destination,
            method,
            timestamp: Local::now(),
        }
    }
}

/// Why a file was left where it is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Gone before we got to it
    Vanished,
    Directory,
    NoExtension,
    NoRule,
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to stat {path}: {source}")]
    Stat {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Move(#[from] MoveError),
}

/// Outcome of handling one actionable event
#[derive(Debug)]
pub enum Disposition {
    Moved(MoveRecord),
    Skipped { path: PathBuf, reason: SkipReason },
    Failed { path: PathBuf, error: ProcessError },
}

impl Disposition {
    pub fn is_moved(&self) -> bool {
        matches!(self, Disposition::Moved(_))
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Disposition::Skipped { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    pub fn move_record(&self) -> Option<&MoveRecord> {
        match self {
            Disposition::Moved(record) => Some(record),
            _ => None,
        }
    }
}
