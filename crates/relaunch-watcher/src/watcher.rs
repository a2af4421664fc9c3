//! Directory watcher driving restarts
//!
//! File system events only arm a timer. Once no event arrived for the
//! configured restart delay, every watched root is re-snapshotted, the
//! differences are pushed into the overlay store and a restart is requested.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use relaunch_kernel::{OverlayRecord, OverlayStore};
use relaunch_runtime::RestartController;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, trace, warn};

use crate::config::WatchConfig;
use crate::error::{WatchError, WatchResult};
use crate::snapshot::{Snapshot, diff_layers};
use crate::trigger::RestartTrigger;

struct Scanner {
    config: WatchConfig,
    overlay: Arc<OverlayStore>,
    trigger: Arc<dyn RestartTrigger>,
    snapshots: Mutex<Vec<Snapshot>>,
}

impl Scanner {
    fn roots(&self) -> Vec<PathBuf> {
        self.snapshots
            .lock()
            .iter()
            .map(|snapshot| snapshot.root().to_path_buf())
            .collect()
    }

    fn is_relevant(&self, event: &Event) -> bool {
        !matches!(event.kind, EventKind::Access(_)) && event.paths.iter().any(|path| self.config.should_watch(path))
    }

    /// Rescan every root and diff the merged views, first root winning.
    fn collect(&self) -> Vec<OverlayRecord> {
        let mut snapshots = self.snapshots.lock();

        let newer: Vec<Snapshot> = snapshots
            .iter()
            .map(|snapshot| {
                let root = snapshot.root();
                if !root.is_dir() {
                    return Snapshot::empty(root);
                }
                Snapshot::take(root, &self.config, Some(snapshot)).unwrap_or_else(|err| {
                    warn!(root = %root.display(), error = %err, "Failed to scan directory");
                    snapshot.clone()
                })
            })
            .collect();

        let records = diff_layers(&snapshots, &newer);
        *snapshots = newer;
        records
    }

    fn apply_changes(&self) -> usize {
        let records = self.collect();
        if records.is_empty() {
            debug!("File system events produced no changes");
            return 0;
        }

        let count = |kind: &str| records.iter().filter(|record| record.kind() == kind).count();
        info!(
            added = count("added"),
            modified = count("modified"),
            deleted = count("deleted"),
            "Detected changes, restarting"
        );

        let applied = self.overlay.apply(records);
        if let Err(err) = self.trigger.restart() {
            warn!(error = %err, "Restart failed, waiting for the next build");
        }
        applied
    }
}

/// Watches code directories and restarts the application when they change.
pub struct ClasspathWatcher {
    scanner: Arc<Scanner>,
    watcher: Option<RecommendedWatcher>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ClasspathWatcher {
    pub fn new(config: WatchConfig, overlay: Arc<OverlayStore>, trigger: Arc<dyn RestartTrigger>) -> Self {
        Self {
            scanner: Arc::new(Scanner {
                config,
                overlay,
                trigger,
                snapshots: Mutex::new(Vec::new()),
            }),
            watcher: None,
            shutdown_tx: None,
            task: None,
        }
    }

    /// Feed `controller`'s overlay store and restart it on changes.
    pub fn for_controller(config: WatchConfig, controller: &RestartController) -> Self {
        Self::new(config, controller.overlay(), Arc::new(controller.clone()))
    }

    /// Add a directory; its current contents become the baseline.
    pub fn watch(&mut self, path: impl AsRef<Path>) -> WatchResult<()> {
        let path = path.as_ref().to_path_buf();
        if !path.is_dir() {
            return Err(WatchError::NotADirectory(path));
        }
        if self.watched_paths().contains(&path) {
            return Ok(());
        }

        let baseline = Snapshot::take(&path, &self.scanner.config, None)?;
        info!(path = %path.display(), files = baseline.len(), "Adding watch path");

        let mode = self.mode();
        if let Some(watcher) = self.watcher.as_mut() {
            watcher.watch(&path, mode)?;
        }
        self.scanner.snapshots.lock().push(baseline);
        Ok(())
    }

    /// Start listening for file system events.
    pub async fn start(&mut self) -> WatchResult<()> {
        if self.watcher.is_some() {
            return Err(WatchError::AlreadyRunning);
        }
        info!("Starting classpath watcher");

        let (event_tx, event_rx) = mpsc::channel(1024);
        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    let _ = event_tx.blocking_send(event);
                }
                Err(err) => warn!(error = %err, "File system watch error"),
            },
            notify::Config::default(),
        )?;

        let mode = self.mode();
        for root in self.scanner.roots() {
            watcher.watch(&root, mode)?;
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        self.task = Some(tokio::spawn(run_events(
            Arc::clone(&self.scanner),
            event_rx,
            shutdown_rx,
        )));
        self.watcher = Some(watcher);
        self.shutdown_tx = Some(shutdown_tx);
        Ok(())
    }

    /// Stop listening and wait for an in-flight restart to finish.
    pub async fn stop(&mut self) {
        info!("Stopping classpath watcher");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        self.watcher = None;

        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                error!(error = %err, "Watcher task ended abnormally");
            }
        }
    }

    /// Scan now instead of waiting for events. Returns the number of
    /// records pushed; blocks for the restart when there were any.
    pub fn poll_changes(&self) -> usize {
        self.scanner.apply_changes()
    }

    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.scanner.roots()
    }

    pub fn config(&self) -> &WatchConfig {
        &self.scanner.config
    }

    fn mode(&self) -> RecursiveMode {
        if self.scanner.config.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        }
    }
}

async fn run_events(scanner: Arc<Scanner>, mut events: mpsc::Receiver<Event>, mut shutdown: mpsc::Receiver<()>) {
    let delay = scanner.config.restart_delay;
    let mut deadline: Option<Instant> = None;

    loop {
        let quiet = async move {
            match deadline {
                Some(at) => sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            event = events.recv() => match event {
                Some(event) if scanner.is_relevant(&event) => {
                    trace!(kind = ?event.kind, paths = ?event.paths, "File system event");
                    deadline = Some(Instant::now() + delay);
                }
                Some(_) => {}
                None => return,
            },
            () = quiet => {
                deadline = None;
                let scanner = Arc::clone(&scanner);
                if let Err(err) = tokio::task::spawn_blocking(move || scanner.apply_changes()).await {
                    error!(error = %err, "Change scan failed");
                }
            }
            _ = shutdown.recv() => {
                info!("Classpath watcher shutting down");
                return;
            }
        }
    }
}
