use std::path::Path;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::WatchEvent;

/// A live subscription on one directory.
///
/// Each stream closes when its producer goes away; the pipeline treats
/// either closing as fatal.
pub struct Subscription {
    pub events: UnboundedReceiver<WatchEvent>,
    pub errors: UnboundedReceiver<notify::Error>,
    _watcher: Option<RecommendedWatcher>,
}

/// Producer side of a [`Subscription`]
#[derive(Clone)]
pub struct SubscriptionHandle {
    pub events: UnboundedSender<WatchEvent>,
    pub errors: UnboundedSender<notify::Error>,
}

impl Subscription {
    /// A subscription fed by hand through the returned handle
    pub fn channel() -> (SubscriptionHandle, Subscription) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        (
            SubscriptionHandle {
                events: event_tx,
                errors: error_tx,
            },
            Subscription {
                events: event_rx,
                errors: error_rx,
                _watcher: None,
            },
        )
    }
}

/// Something that can watch a directory for changes
pub trait EventSource {
    fn subscribe(&mut self, path: &Path) -> notify::Result<Subscription>;
}

/// Watches the directory (non-recursively) with the platform's native backend
#[derive(Debug, Default)]
pub struct NotifySource;

impl NotifySource {
    pub fn new() -> Self {
        Self
    }
}

impl EventSource for NotifySource {
    fn subscribe(&mut self, path: &Path) -> notify::Result<Subscription> {
        let (handle, mut subscription) = Subscription::channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    for event in WatchEvent::from_notify(event) {
                        // Receiver dropped, nothing left to notify
                        if handle.events.send(event).is_err() {
                            return;
                        }
                    }
                }
                Err(err) => {
                    let _ = handle.errors.send(err);
                }
            }
        })?;

        watcher.watch(path, RecursiveMode::NonRecursive)?;
        tracing::info!("Watching directory: {}", path.display());

        subscription._watcher = Some(watcher);
        Ok(subscription)
    }
}

/// Hands out a subscription fed through a [`SubscriptionHandle`].
///
/// Only the first `subscribe` succeeds.
pub struct ChannelSource {
    pending: Option<Subscription>,
}

impl ChannelSource {
    pub fn new() -> (Self, SubscriptionHandle) {
        let (handle, subscription) = Subscription::channel();
        (
            Self {
                pending: Some(subscription),
            },
            handle,
        )
    }
}

impl EventSource for ChannelSource {
    fn subscribe(&mut self, _path: &Path) -> notify::Result<Subscription> {
        self.pending
            .take()
            .ok_or_else(|| notify::Error::generic("channel source already subscribed"))
    }
}
