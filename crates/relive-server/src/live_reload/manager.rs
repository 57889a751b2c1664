//! Change watcher.
//!
//! Coordinates file watching, rebuilding and broadcasting for live reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::build::BuildStep;
use super::classifier::{self, ChangeEvent, Classification};
use super::command::Command;
use super::registry::ChannelRegistry;

/// Watches a directory and broadcasts reload commands on change.
pub(crate) struct ChangeWatcher {
    watch_path: PathBuf,
    ignore: Vec<glob::Pattern>,
    registry: Arc<ChannelRegistry>,
    build: Option<Arc<dyn BuildStep>>,
    watcher: Option<RecommendedWatcher>,
}

impl ChangeWatcher {
    /// Create a new change watcher.
    ///
    /// # Arguments
    ///
    /// * `watch_path` - Directory to watch recursively
    /// * `ignore` - Glob patterns, relative to `watch_path`, to skip
    /// * `registry` - Channels to broadcast to
    /// * `build` - Build step to run before each broadcast
    pub(crate) fn new(
        watch_path: PathBuf,
        ignore: &[String],
        registry: Arc<ChannelRegistry>,
        build: Option<Arc<dyn BuildStep>>,
    ) -> Self {
        let ignore = ignore
            .iter()
            .filter_map(|p| match glob::Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    tracing::warn!(pattern = %p, error = %e, "Ignoring invalid ignore pattern");
                    None
                }
            })
            .collect();
        Self {
            watch_path,
            ignore,
            registry,
            build,
            watcher: None,
        }
    }

    /// Start the file watcher.
    ///
    /// Spawns a background task that handles change events one at a time,
    /// in the order the watcher reports them. The task ends when this
    /// watcher is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the file watcher cannot be created.
    pub(crate) fn start(&mut self) -> Result<(), notify::Error> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

        // Callback runs on the notify thread
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => tracing::warn!(error = %e, "File watcher error"),
            }
        })?;

        watcher.watch(&self.watch_path, RecursiveMode::Recursive)?;
        self.watcher = Some(watcher);
        tracing::info!(path = %self.watch_path.display(), "Watching for changes");

        let watch_path = self.watch_path.clone();
        let ignore = self.ignore.clone();
        let registry = Arc::clone(&self.registry);
        let build = self.build.clone();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                for change in ChangeEvent::from_notify(&event) {
                    if let Some(path) = &change.path
                        && Self::is_ignored(path, &watch_path, &ignore)
                    {
                        continue;
                    }
                    Self::handle_change(&change, &registry, build.as_deref()).await;
                }
            }
        });

        Ok(())
    }

    /// Handle one change event.
    ///
    /// Runs the build step to completion before broadcasting. A failed build
    /// suppresses the broadcast. Returns the command sent, if any.
    pub(crate) async fn handle_change(
        change: &ChangeEvent,
        registry: &ChannelRegistry,
        build: Option<&dyn BuildStep>,
    ) -> Option<Command> {
        let Classification::Broadcast(command) = classifier::classify(change) else {
            return None;
        };
        let start = Instant::now();

        if let Some(build) = build
            && let Err(e) = build.build().await
        {
            tracing::error!(error = %e, "Build failed, skipping reload");
            return None;
        }

        let delivered = registry.broadcast(command);

        tracing::info!(
            path = ?change.path,
            %command,
            delivered,
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Live reload event processed"
        );
        Some(command)
    }

    /// Check if a path matches any ignore pattern.
    fn is_ignored(path: &Path, watch_path: &Path, patterns: &[glob::Pattern]) -> bool {
        let Ok(relative) = path.strip_prefix(watch_path) else {
            return false;
        };
        patterns.iter().any(|pattern| pattern.matches_path(relative))
    }
}
