//! Filesystem change source.
//!
//! Raw notify events are coalesced per path and flushed as one batch every
//! poll interval, so a burst of editor writes turns into a single reload.

use crate::error::WatchError;
use notify::event::{AccessKind, AccessMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// A single change to a watched file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Whether the file was gone when the change was reported.
    pub was_removed: bool,
}

impl ChangeEvent {
    pub fn changed(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            was_removed: false,
        }
    }

    pub fn removed(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            was_removed: true,
        }
    }
}

/// Hot reload configuration.
#[derive(Debug, Clone)]
pub struct ReloadConfig {
    /// Directory whose contents are pushed to open pages.
    pub watch_dir: PathBuf,
    /// Shell-glob patterns matched against file base names.
    pub ignore_patterns: Vec<String>,
    /// How often accumulated changes are flushed as a batch.
    pub poll_interval: Duration,
    /// Watch subdirectories too.
    pub recursive: bool,
}

impl ReloadConfig {
    pub fn new(watch_dir: impl Into<PathBuf>) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            ..Self::default()
        }
    }
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::from("."),
            ignore_patterns: Vec::new(),
            poll_interval: Duration::from_secs(1),
            recursive: true,
        }
    }
}

/// Produces batches of change events for a directory tree.
///
/// Each call to `watch` starts an independent watch that ends when `done`
/// fires or the returned receiver is dropped. A batch may be empty. An `Err`
/// means the watch could not be established at all.
pub trait ChangeSource: Send + Sync + 'static {
    fn watch(
        &self,
        done: CancellationToken,
        root: &Path,
        recursive: bool,
        poll_interval: Duration,
    ) -> Result<mpsc::Receiver<Vec<ChangeEvent>>, WatchError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// NotifyWatcher
// ─────────────────────────────────────────────────────────────────────────────

/// `ChangeSource` backed by the platform's recommended notify watcher.
///
/// Must be called from within a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyWatcher;

impl ChangeSource for NotifyWatcher {
    fn watch(
        &self,
        done: CancellationToken,
        root: &Path,
        recursive: bool,
        poll_interval: Duration,
    ) -> Result<mpsc::Receiver<Vec<ChangeEvent>>, WatchError> {
        let root = root.canonicalize().map_err(|source| WatchError::Root {
            path: root.to_path_buf(),
            source,
        })?;

        let (notify_tx, notify_rx) = mpsc::channel::<notify::Result<Event>>(256);

        // Callback runs on notify's own thread
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = notify_tx.blocking_send(res);
            },
            Config::default(),
        )?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(&root, mode)?;
        info!("Watching {} for reload", root.display());

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(collect_batches(watcher, notify_rx, tx, done, poll_interval));

        Ok(rx)
    }
}

/// Accumulates touched paths and flushes them once per tick.
///
/// Owns the watcher so it lives exactly as long as this loop.
async fn collect_batches(
    watcher: RecommendedWatcher,
    mut notify_rx: mpsc::Receiver<notify::Result<Event>>,
    tx: mpsc::Sender<Vec<ChangeEvent>>,
    done: CancellationToken,
    poll_interval: Duration,
) {
    let mut pending: BTreeSet<PathBuf> = BTreeSet::new();
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = done.cancelled() => break,
            _ = tx.closed() => break,

            _ = ticker.tick() => {
                if pending.is_empty() {
                    continue;
                }
                let batch: Vec<ChangeEvent> = std::mem::take(&mut pending)
                    .into_iter()
                    .map(|path| {
                        let was_removed = !path.exists();
                        ChangeEvent { path, was_removed }
                    })
                    .collect();
                debug!("Flushing {} change(s)", batch.len());
                if tx.send(batch).await.is_err() {
                    break;
                }
            }

            event = notify_rx.recv() => match event {
                Some(Ok(event)) => {
                    if is_content_change(&event.kind) {
                        pending.extend(event.paths);
                    }
                }
                Some(Err(e)) => warn!("Watch error: {}", e),
                None => break,
            },
        }
    }

    drop(watcher);
    debug!("File watcher stopped");
}

/// Reads never count as changes; only a close after writing does.
fn is_content_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => true,
        EventKind::Access(_) => false,
        _ => true,
    }
}
