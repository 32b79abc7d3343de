//! File-watching build driver.
//!
//! # Responsibilities
//! - Watch the bundle (or a source directory) for changes
//! - Debounce bursts of file events into one build
//! - Optionally run a build command before publishing
//! - Publish every attempt through the [`BuildCoordinator`]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::process::Command;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::coordinator::BuildCoordinator;
use super::BuildError;

/// Where to look and what to run.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub bundle_path: PathBuf,
    /// Source directory to watch. Defaults to the bundle's parent directory.
    pub watch_dir: Option<PathBuf>,
    /// Program and arguments producing `bundle_path`.
    pub command: Option<Vec<String>>,
    pub debounce: Duration,
}

impl WatchOptions {
    pub fn new(bundle_path: impl Into<PathBuf>) -> Self {
        Self {
            bundle_path: bundle_path.into(),
            watch_dir: None,
            command: None,
            debounce: Duration::from_millis(100),
        }
    }

    fn watch_target(&self) -> (PathBuf, RecursiveMode) {
        match &self.watch_dir {
            Some(dir) => (dir.clone(), RecursiveMode::Recursive),
            None => {
                let parent = self
                    .bundle_path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or(Path::new("."));
                (parent.to_path_buf(), RecursiveMode::NonRecursive)
            }
        }
    }

    /// Whether an event should trigger a build.
    fn is_relevant(&self, event: &Event) -> bool {
        if !(event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove()) {
            return false;
        }
        let is_bundle = |p: &PathBuf| p.file_name() == self.bundle_path.file_name();
        match (&self.watch_dir, &self.command) {
            // Our own output would retrigger the command.
            (Some(_), Some(_)) => !event.paths.iter().all(is_bundle),
            (Some(_), None) => true,
            (None, _) => event.paths.iter().any(is_bundle),
        }
    }
}

/// Drives builds from file system events.
pub struct BundleWatcher {
    options: WatchOptions,
    coordinator: Arc<BuildCoordinator>,
}

/// A running watcher. Dropping it stops file notifications.
pub struct WatcherHandle {
    task: JoinHandle<()>,
    _watcher: RecommendedWatcher,
}

impl WatcherHandle {
    /// Wait for the build loop to exit after shutdown was signalled.
    pub async fn stopped(self) {
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Bundle watcher task failed");
        }
    }
}

impl BundleWatcher {
    pub fn new(options: WatchOptions, coordinator: Arc<BuildCoordinator>) -> Self {
        Self {
            options,
            coordinator,
        }
    }

    /// Perform the initial build, then rebuild on every relevant change.
    pub fn spawn(self, mut shutdown: broadcast::Receiver<()>) -> Result<WatcherHandle, notify::Error> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => tracing::error!(error = %e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let (target, mode) = self.options.watch_target();
        watcher.watch(&target, mode)?;
        tracing::info!(path = %target.display(), "Bundle watcher started");

        let task = tokio::spawn(async move {
            self.build_once().await;
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    event = rx.recv() => {
                        let Some(event) = event else { break };
                        if !self.options.is_relevant(&event) {
                            continue;
                        }
                        tokio::time::sleep(self.options.debounce).await;
                        while rx.try_recv().is_ok() {}
                        tracing::info!(paths = ?event.paths, "Change detected");
                        self.build_once().await;
                    }
                }
            }
            tracing::info!("Bundle watcher stopped");
        });

        Ok(WatcherHandle {
            task,
            _watcher: watcher,
        })
    }

    async fn build_once(&self) {
        self.coordinator.run_build(|| build_bundle(&self.options)).await;
    }
}

async fn build_bundle(options: &WatchOptions) -> Result<PathBuf, BuildError> {
    if let Some(command) = &options.command {
        run_command(command).await?;
    }
    if tokio::fs::metadata(&options.bundle_path).await.is_err() {
        return Err(BuildError::MissingBundle(options.bundle_path.clone()));
    }
    Ok(options.bundle_path.clone())
}

async fn run_command(command: &[String]) -> Result<(), BuildError> {
    let (program, args) = command.split_first().ok_or(BuildError::EmptyCommand)?;
    tracing::debug!(program = %program, ?args, "Running build command");

    let status = Command::new(program).args(args).status().await?;
    if status.success() {
        Ok(())
    } else {
        Err(BuildError::CommandFailed {
            command: command.join(" "),
            status,
        })
    }
}
