//! Single-file relocation.
//!
//! A move is first attempted as an atomic rename. When source and
//! destination live on different filesystems the rename reports
//! [`io::ErrorKind::CrossesDevices`] and the file is copied, synced and the
//! source removed instead. That fallback is not atomic: a failure part way
//! through can leave a partial destination behind.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::events::MoveMethod;

/// Rename primitive used for the fast path
pub type RenameFn = fn(&Path, &Path) -> io::Result<()>;

#[derive(Error, Debug)]
pub enum MoveError {
    #[error("failed to rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("opening source file {path}: {source}")]
    OpenSource { path: PathBuf, source: io::Error },

    #[error("creating destination file {path}: {source}")]
    CreateDestination { path: PathBuf, source: io::Error },

    #[error("copying {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("syncing destination file {path}: {source}")]
    Sync { path: PathBuf, source: io::Error },

    #[error("removing source file {path}: {source}")]
    RemoveSource { path: PathBuf, source: io::Error },
}

impl MoveError {
    /// Whether the failure happened inside the copy-then-delete fallback
    pub fn is_cross_device_fallback(&self) -> bool {
        !matches!(self, MoveError::Rename { .. })
    }
}

pub fn is_cross_device(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::CrossesDevices
}

fn system_rename(from: &Path, to: &Path) -> io::Result<()> {
    fs::rename(from, to)
}

#[derive(Debug, Clone, Copy)]
pub struct FileMover {
    rename: RenameFn,
}

impl Default for FileMover {
    fn default() -> Self {
        Self {
            rename: system_rename,
        }
    }
}

impl FileMover {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different rename primitive for the fast path
    pub fn with_rename(rename: RenameFn) -> Self {
        Self { rename }
    }

    pub fn move_file(&self, from: &Path, to: &Path) -> Result<MoveMethod, MoveError> {
        match (self.rename)(from, to) {
            Ok(()) => Ok(MoveMethod::Renamed),
            Err(err) if is_cross_device(&err) => {
                tracing::debug!(
                    "Rename of {} crosses devices, copying instead",
                    from.display()
                );
                copy_and_remove(from, to)?;
                Ok(MoveMethod::Copied)
            }
            Err(err) => Err(MoveError::Rename {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                source: err,
            }),
        }
    }
}

/// Copy `from` to `to` with the same permissions, flush it to disk, then
/// remove `from`.
pub fn copy_and_remove(from: &Path, to: &Path) -> Result<(), MoveError> {
    let mut src = File::open(from).map_err(|source| MoveError::OpenSource {
        path: from.to_path_buf(),
        source,
    })?;
    let permissions = src
        .metadata()
        .map_err(|source| MoveError::OpenSource {
            path: from.to_path_buf(),
            source,
        })?
        .permissions();

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(permissions.mode());
    }
    let mut dst = options.open(to).map_err(|source| MoveError::CreateDestination {
        path: to.to_path_buf(),
        source,
    })?;
    // The creation mode is filtered by the umask; apply the exact bits
    dst.set_permissions(permissions)
        .map_err(|source| MoveError::CreateDestination {
            path: to.to_path_buf(),
            source,
        })?;

    io::copy(&mut src, &mut dst).map_err(|source| MoveError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })?;

    dst.sync_all().map_err(|source| MoveError::Sync {
        path: to.to_path_buf(),
        source,
    })?;

    drop(src);
    fs::remove_file(from).map_err(|source| MoveError::RemoveSource {
        path: from.to_path_buf(),
        source,
    })?;

    Ok(())
}
