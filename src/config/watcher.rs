//! Configuration file watcher for hot reload.
//!
//! Editors usually save through a temp file and a rename, and a single save
//! produces a burst of events. The parent directory is watched, events for
//! other files are ignored, and a burst is coalesced into one reload.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time;

use crate::config::loader::load_config;
use crate::config::schema::SyncConfig;

/// Quiet period after the last file event before reloading.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Watches the sync configuration file and emits validated reloads.
pub struct ConfigWatcher {
    path: PathBuf,
    debounce: Duration,
    update_tx: mpsc::UnboundedSender<SyncConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<SyncConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                debounce: DEFAULT_DEBOUNCE,
                update_tx,
            },
            update_rx,
        )
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching. Must be called inside a Tokio runtime; the returned
    /// watcher must be kept alive, and dropping it ends the reload task.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let file_name: Option<OsString> = self.path.file_name().map(OsString::from);
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (signal_tx, signal_rx) = mpsc::unbounded_channel::<()>();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = (event.kind.is_modify() || event.kind.is_create())
                        && event
                            .paths
                            .iter()
                            .any(|p| p.file_name().map(OsString::from) == file_name);
                    if relevant {
                        let _ = signal_tx.send(());
                    }
                }
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let path = self.path.clone();
        let tx = self.update_tx;
        tokio::spawn(coalesce(signal_rx, self.debounce, move || {
            match load_config(&path) {
                Ok(config) => {
                    tracing::info!(path = ?path, polls = config.polls.len(), "Configuration reloaded");
                    tx.send(config).is_ok()
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                    true
                }
            }
        }));

        tracing::info!(path = ?self.path, debounce_ms = self.debounce.as_millis() as u64, "Config watcher started");
        Ok(watcher)
    }
}

/// Call `settled` once per burst of signals, after `window` of quiet.
/// Stops when the signal source goes away or `settled` returns false.
async fn coalesce<F>(mut signals: mpsc::UnboundedReceiver<()>, window: Duration, settled: F)
where
    F: Fn() -> bool,
{
    while signals.recv().await.is_some() {
        loop {
            match time::timeout(window, signals.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return,
                Err(_) => break,
            }
        }
        if !settled() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_events_reloads_once() {
        let (tx, rx) = mpsc::unbounded_channel();
        let reloads = Arc::new(AtomicU32::new(0));
        let counter = reloads.clone();
        let task = tokio::spawn(coalesce(rx, Duration::from_millis(300), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        }));

        for _ in 0..4 {
            tx.send(()).unwrap();
            time::sleep(Duration::from_millis(50)).await;
        }
        time::sleep(Duration::from_millis(400)).await;
        assert_eq!(reloads.load(Ordering::SeqCst), 1);

        tx.send(()).unwrap();
        time::sleep(Duration::from_millis(400)).await;
        assert_eq!(reloads.load(Ordering::SeqCst), 2);

        drop(tx);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_updates_are_unwanted() {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(coalesce(rx, Duration::from_millis(100), || false));

        tx.send(()).unwrap();
        time::sleep(Duration::from_millis(200)).await;
        assert!(task.is_finished());
    }
}
