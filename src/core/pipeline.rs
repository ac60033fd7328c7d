use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::collision::{Clock, CollisionResolver, SystemClock};
use super::mover::FileMover;
use super::rules::{file_extension, RuleIndex};
use crate::config::FwatchConfig;
use crate::events::{Disposition, MoveRecord, ProcessError, SkipReason, WatchEvent};
use crate::watcher::{EventSource, Subscription};

/// Conditions that stop the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to watch {path}: {source}")]
    Subscribe {
        path: PathBuf,
        source: notify::Error,
    },
    #[error("watcher events channel closed")]
    EventStreamClosed,
    #[error("watcher errors channel closed")]
    ErrorStreamClosed,
}

/// Routes files from a watched directory to their rule destinations.
///
/// Events are handled strictly one at a time: the debounce sleep and the
/// move of one file complete before the next event is read.
pub struct EventPipeline {
    index: RuleIndex,
    resolver: CollisionResolver,
    mover: FileMover,
    debounce: Duration,
}

impl EventPipeline {
    pub fn new(
        index: RuleIndex,
        resolver: CollisionResolver,
        mover: FileMover,
        debounce: Duration,
    ) -> Self {
        Self {
            index,
            resolver,
            mover,
            debounce,
        }
    }

    pub fn from_config(config: &FwatchConfig) -> Self {
        Self::from_config_with_clock(config, Arc::new(SystemClock))
    }

    pub fn from_config_with_clock(config: &FwatchConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            RuleIndex::build(&config.rules),
            CollisionResolver::new(clock, config.pipeline.timestamp_format.clone()),
            FileMover::new(),
            config.pipeline.debounce_duration(),
        )
    }

    /// Swap the move engine, e.g. for one with a different rename primitive
    pub fn with_mover(mut self, mover: FileMover) -> Self {
        self.mover = mover;
        self
    }

    pub fn rules(&self) -> &RuleIndex {
        &self.index
    }

    /// Subscribe to `dir` and process its events until a stream closes
    pub async fn watch<S, F>(
        &self,
        source: &mut S,
        dir: &Path,
        observer: F,
    ) -> Result<(), PipelineError>
    where
        S: EventSource,
        F: FnMut(&Disposition),
    {
        let subscription = source
            .subscribe(dir)
            .map_err(|source| PipelineError::Subscribe {
                path: dir.to_path_buf(),
                source,
            })?;
        self.run(subscription, observer).await
    }

    /// Process events until either stream closes.
    ///
    /// Always returns an error: the loop has no graceful exit.
    pub async fn run<F>(&self, mut subscription: Subscription, mut observer: F) -> Result<(), PipelineError>
    where
        F: FnMut(&Disposition),
    {
        let result = loop {
            tokio::select! {
                // Drain pending events before noticing a closed error stream
                biased;

                event = subscription.events.recv() => match event {
                    Some(event) => {
                        if let Some(disposition) = self.handle_event(event).await {
                            observer(&disposition);
                        }
                    }
                    None => break Err(PipelineError::EventStreamClosed),
                },
                err = subscription.errors.recv() => match err {
                    Some(err) => tracing::error!("Watcher error: {}", err),
                    None => break Err(PipelineError::ErrorStreamClosed),
                },
            }
        };

        if let Err(err) = &result {
            tracing::error!("Pipeline stopped: {}", err);
        }
        result
    }

    /// Debounce and process one event; `None` when its kind is not actionable
    pub async fn handle_event(&self, event: WatchEvent) -> Option<Disposition> {
        if !event.kind.is_actionable() {
            return None;
        }
        tracing::debug!("{:?} {}", event.kind, event.path.display());

        // Give the producer a moment to finish writing
        if !self.debounce.is_zero() {
            tokio::time::sleep(self.debounce).await;
        }

        Some(self.process_file(&event.path))
    }

    /// Route one file now. Per-file errors are logged and returned, never raised.
    pub fn process_file(&self, path: &Path) -> Disposition {
        // Follows symlinks: a link to a directory is a directory, a dangling one is gone
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return skipped(path, SkipReason::Vanished);
            }
            Err(err) => {
                tracing::warn!("Error stating file {}: {}", path.display(), err);
                return Disposition::Failed {
                    path: path.to_path_buf(),
                    error: ProcessError::Stat {
                        path: path.to_path_buf(),
                        source: err,
                    },
                };
            }
        };

        if metadata.is_dir() {
            return skipped(path, SkipReason::Directory);
        }

        let Some(ext) = file_extension(path) else {
            return skipped(path, SkipReason::NoExtension);
        };
        let Some(destination) = self.index.lookup(&ext) else {
            return skipped(path, SkipReason::NoRule);
        };
        let Some(file_name) = path.file_name() else {
            return skipped(path, SkipReason::NoExtension);
        };

        let target = self.resolver.resolve(&destination.join(file_name));

        match self.mover.move_file(path, &target) {
            Ok(method) => {
                tracing::info!("Moved: {} → {}", path.display(), target.display());
                Disposition::Moved(MoveRecord::new(path.to_path_buf(), target, method))
            }
            Err(err) => {
                tracing::error!(
                    "Error moving file {} to {}: {}",
                    path.display(),
                    target.display(),
                    err
                );
                Disposition::Failed {
                    path: path.to_path_buf(),
                    error: err.into(),
                }
            }
        }
    }
}

fn skipped(path: &Path, reason: SkipReason) -> Disposition {
    Disposition::Skipped {
        path: path.to_path_buf(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipelineConfig, Rule};
    use crate::events::{MoveMethod, WatchEventKind};
    use crate::core::collision::FixedClock;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        inbox: PathBuf,
        archives: PathBuf,
        pipeline: EventPipeline,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let inbox = temp.path().join("inbox");
        let archives = temp.path().join("archives");
        fs::create_dir_all(&inbox).unwrap();
        fs::create_dir_all(&archives).unwrap();

        let config = FwatchConfig {
            watch_dir: inbox.clone(),
            create_dirs: false,
            rules: vec![Rule::new([".zip"], archives.clone())],
            pipeline: PipelineConfig {
                debounce_ms: 0,
                ..PipelineConfig::default()
            },
        };
        let instant = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(15, 30, 45)
            .unwrap();
        let pipeline = EventPipeline::from_config_with_clock(&config, Arc::new(FixedClock(instant)));

        Fixture {
            _temp: temp,
            inbox,
            archives,
            pipeline,
        }
    }

    #[test]
    fn test_moves_matching_file() {
        let fx = fixture();
        let file = fx.inbox.join("data.ZIP");
        fs::write(&file, "payload").unwrap();

        let disposition = fx.pipeline.process_file(&file);

        let record = disposition.move_record().expect("file should be moved");
        assert_eq!(record.destination, fx.archives.join("data.ZIP"));
        assert_eq!(record.method, MoveMethod::Renamed);
        assert!(!file.exists());
        assert_eq!(fs::read_to_string(fx.archives.join("data.ZIP")).unwrap(), "payload");
    }

    #[test]
    fn test_collision_gets_timestamp() {
        let fx = fixture();
        fs::write(fx.archives.join("data.zip"), "old").unwrap();
        let file = fx.inbox.join("data.zip");
        fs::write(&file, "new").unwrap();

        let disposition = fx.pipeline.process_file(&file);

        let expected = fx.archives.join("data-20240115-153045.zip");
        assert_eq!(disposition.move_record().unwrap().destination, expected);
        assert_eq!(fs::read_to_string(&expected).unwrap(), "new");
        assert_eq!(fs::read_to_string(fx.archives.join("data.zip")).unwrap(), "old");
    }

    #[test]
    fn test_skips_leave_files_alone() {
        let fx = fixture();
        let no_ext = fx.inbox.join("README");
        let no_rule = fx.inbox.join("notes.txt");
        let dir = fx.inbox.join("folder.zip");
        fs::write(&no_ext, "a").unwrap();
        fs::write(&no_rule, "b").unwrap();
        fs::create_dir(&dir).unwrap();

        assert_eq!(fx.pipeline.process_file(&no_ext).skip_reason(), Some(SkipReason::NoExtension));
        assert_eq!(fx.pipeline.process_file(&no_rule).skip_reason(), Some(SkipReason::NoRule));
        assert_eq!(fx.pipeline.process_file(&dir).skip_reason(), Some(SkipReason::Directory));
        assert_eq!(
            fx.pipeline.process_file(&fx.inbox.join("gone.zip")).skip_reason(),
            Some(SkipReason::Vanished)
        );

        assert!(no_ext.exists());
        assert!(no_rule.exists());
        assert!(dir.is_dir());
        assert_eq!(fs::read_dir(&fx.archives).unwrap().count(), 0);
    }

    #[test]
    fn test_move_failure_is_reported() {
        let fx = fixture();
        fs::remove_dir(&fx.archives).unwrap();
        let file = fx.inbox.join("data.zip");
        fs::write(&file, "payload").unwrap();

        let disposition = fx.pipeline.process_file(&file);

        assert!(matches!(
            disposition,
            Disposition::Failed {
                error: ProcessError::Move(_),
                ..
            }
        ));
        assert!(file.exists());
    }

    #[tokio::test]
    async fn test_non_actionable_events_are_ignored() {
        let fx = fixture();
        let file = fx.inbox.join("data.zip");
        fs::write(&file, "payload").unwrap();

        for kind in [WatchEventKind::Renamed, WatchEventKind::Removed, WatchEventKind::Other] {
            let outcome = fx.pipeline.handle_event(WatchEvent::new(&file, kind)).await;
            assert!(outcome.is_none());
        }
        assert!(file.exists());

        let outcome = fx.pipeline.handle_event(WatchEvent::modified(&file)).await;
        assert!(outcome.unwrap().is_moved());
    }

    #[tokio::test]
    async fn test_chmod_on_resting_file_does_not_move_it() {
        use notify::event::{DataChange, EventKind, MetadataKind, ModifyKind};

        let fx = fixture();
        let file = fx.inbox.join("old.zip");
        fs::write(&file, "payload").unwrap();

        let chmod = notify::Event::new(EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::Permissions,
        )))
        .add_path(file.clone());

        for event in WatchEvent::from_notify(chmod) {
            assert!(fx.pipeline.handle_event(event).await.is_none());
        }
        assert!(file.exists());
        assert!(!fx.archives.join("old.zip").exists());

        let write = notify::Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(file.clone());
        let mut events = WatchEvent::from_notify(write);
        assert_eq!(events.len(), 1);

        let outcome = fx.pipeline.handle_event(events.remove(0)).await;
        assert!(outcome.unwrap().is_moved());
        assert!(fx.archives.join("old.zip").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_followed() {
        use std::os::unix::fs::symlink;

        let fx = fixture();
        let real_dir = fx.inbox.join("realdir");
        fs::create_dir(&real_dir).unwrap();
        let dir_link = fx.inbox.join("link.zip");
        symlink(&real_dir, &dir_link).unwrap();
        let dangling = fx.inbox.join("dangling.zip");
        symlink(fx.inbox.join("nowhere"), &dangling).unwrap();

        assert_eq!(
            fx.pipeline.process_file(&dir_link).skip_reason(),
            Some(SkipReason::Directory)
        );
        assert_eq!(
            fx.pipeline.process_file(&dangling).skip_reason(),
            Some(SkipReason::Vanished)
        );
        assert!(fs::symlink_metadata(&dir_link).is_ok());
        assert!(fs::symlink_metadata(&dangling).is_ok());
        assert_eq!(fs::read_dir(&fx.archives).unwrap().count(), 0);
    }

    #[test]
    fn test_dotfile_named_after_extension_is_routed() {
        let fx = fixture();
        let file = fx.inbox.join(".zip");
        fs::write(&file, "bare").unwrap();

        let disposition = fx.pipeline.process_file(&file);

        assert_eq!(
            disposition.move_record().expect("file should be moved").destination,
            fx.archives.join(".zip")
        );
        assert!(!file.exists());

        // Same name again collides and gets the timestamp before the extension
        fs::write(&file, "again").unwrap();
        let disposition = fx.pipeline.process_file(&file);
        assert_eq!(
            disposition.move_record().unwrap().destination,
            fx.archives.join("-20240115-153045.zip")
        );
    }
}
