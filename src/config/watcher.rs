//! Stub file watcher for hot reload.
//!
//! # Responsibilities
//! - Watch the config file, including editors that replace it by rename
//! - Reload and validate it on change
//! - Hand over the new stub set when it differs from the last one sent
//!
//! # Design Decisions
//! - Only stubs are hot-swapped. The other sections keep their startup
//!   values, so changes to them are logged and otherwise ignored
//! - An invalid file never reaches the server; the previous stubs stay live

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::{StubConfig, StubServerConfig};

/// Watches a config file and emits validated stub sets.
pub struct ConfigWatcher {
    path: PathBuf,
    initial: StubServerConfig,
    update_tx: mpsc::UnboundedSender<Vec<StubConfig>>,
}

impl ConfigWatcher {
    /// `initial` is the config the server started with.
    ///
    /// Returns the watcher and a receiver for stub set updates.
    pub fn new(
        path: &Path,
        initial: StubServerConfig,
    ) -> (Self, mpsc::UnboundedReceiver<Vec<StubConfig>>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                initial,
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let watched = self.path.clone();
        let file_name = self.path.file_name().map(|n| n.to_os_string());
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let reloader = Reloader {
            path: self.path,
            current: Mutex::new(self.initial),
            tx: self.update_tx,
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let touches_file = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if touches_file && is_content_change(&event.kind) {
                        reloader.reload();
                    }
                }
                Err(e) => tracing::error!(error = %e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?watched, "Stub watcher started");
        Ok(watcher)
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Modify(_) | EventKind::Create(_))
}

/// Reload state shared with the notify callback.
struct Reloader {
    path: PathBuf,
    current: Mutex<StubServerConfig>,
    tx: mpsc::UnboundedSender<Vec<StubConfig>>,
}

impl Reloader {
    fn reload(&self) {
        match load_config(&self.path) {
            Ok(next) => {
                let mut current = self
                    .current
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                if let Some(stubs) = stub_update(&current, &next) {
                    tracing::info!(stubs = stubs.len(), "Stub file changed, reloading");
                    if self.tx.send(stubs).is_err() {
                        tracing::debug!("Server gone, dropping stub update");
                    }
                }
                *current = next;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to reload stubs. Keeping current set.");
            }
        }
    }
}

/// The stubs to send for a reload from `current` to `next`, if any.
fn stub_update(current: &StubServerConfig, next: &StubServerConfig) -> Option<Vec<StubConfig>> {
    if next.listener != current.listener
        || next.timeouts != current.timeouts
        || next.observability != current.observability
    {
        tracing::warn!("Only stubs are reloaded; restart to apply listener, timeout or observability changes");
    }
    if next.stubs == current.stubs {
        tracing::debug!("Stub set unchanged");
        None
    } else {
        Some(next.stubs.clone())
    }
}
