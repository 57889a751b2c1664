//! Configuration reload.
//!
//! Watches the config file the server was started from. On change the
//! router is rebuilt with the same [`ReloadContext`], so open push channels
//! survive and are told to reload. The listen address is not re-bound.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use relive_config::{CliSettings, Config};
use tokio::sync::mpsc;

use crate::app::{self, HotRouter};
use crate::error::ServerError;
use crate::live_reload::{Command, ReloadContext};
use crate::server_config_from_config;

/// Where the running configuration came from.
#[derive(Clone, Debug)]
pub struct ConfigSource {
    /// Config file to watch.
    pub path: PathBuf,
    /// CLI overrides to re-apply on every reload.
    pub settings: CliSettings,
}

/// Start watching the config file.
///
/// The returned watcher must be kept alive for reloads to happen.
pub(crate) fn watch_config(
    source: ConfigSource,
    hot: HotRouter,
    context: Arc<ReloadContext>,
) -> Result<RecommendedWatcher, ServerError> {
    let path = source.path.canonicalize()?;
    let dir = path.parent().unwrap_or(Path::new("/")).to_path_buf();
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();

    let watched = path.clone();
    let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        if let Ok(event) = res
            && (event.kind.is_modify() || event.kind.is_create())
            && event.paths.iter().any(|p| p == &watched)
        {
            let _ = tx.send(());
        }
    })?;

    // Editors often replace the file, which drops a watch on the file itself
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    tracing::info!(path = %path.display(), "Watching configuration file");

    let source = ConfigSource { path, ..source };
    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            if let Err(e) = reinitialize(&source, &hot, &context) {
                tracing::error!(error = %e, "Configuration reload failed, keeping previous settings");
            }
        }
    });

    Ok(watcher)
}

/// Reload the config file and swap in a freshly built router.
fn reinitialize(
    source: &ConfigSource,
    hot: &HotRouter,
    context: &ReloadContext,
) -> Result<(), ServerError> {
    let config = Config::load(Some(&source.path), Some(&source.settings))?;
    let router = app::create_router(&server_config_from_config(&config), context)?;
    hot.replace(router);

    let delivered = context.registry().broadcast(Command::Reload);
    tracing::info!(path = %source.path.display(), delivered, "Configuration reloaded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::Router;
    use axum::body::Body;
    use axum::extract::Request;
    use axum::routing::get;
    use tower::ServiceExt;

    use crate::live_reload::Channel;

    async fn fetch_body(router: Router) -> String {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn write_config(dir: &Path, root: &str) -> PathBuf {
        let path = dir.join(relive_config::CONFIG_FILENAME);
        std::fs::write(
            &path,
            format!("[site]\nroot = \"{root}\"\n\n[live_reload]\nwatch = false\n"),
        )
        .unwrap();
        path
    }

    #[tokio::test]
    async fn test_reinitialize_swaps_router_and_reloads_clients() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("new")).unwrap();
        std::fs::write(dir.path().join("new/index.html"), "new site").unwrap();
        let path = write_config(dir.path(), "new");

        let context = ReloadContext::new();
        let (channel, mut rx) = Channel::new();
        context.registry().register(channel);

        let hot = HotRouter::new(Router::new().route("/", get(|| async { "old site" })));
        let router = hot.clone().into_router();
        let source = ConfigSource {
            path,
            settings: CliSettings::default(),
        };

        reinitialize(&source, &hot, &context).unwrap();

        assert_eq!(rx.try_recv().unwrap(), Command::Reload);
        assert!(fetch_body(router).await.starts_with("new site"));
    }

    #[tokio::test]
    async fn test_invalid_config_keeps_previous_router() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(relive_config::CONFIG_FILENAME);
        std::fs::write(&path, "[server]\nport = 0\n").unwrap();

        let hot = HotRouter::new(Router::new().route("/", get(|| async { "old site" })));
        let router = hot.clone().into_router();
        let source = ConfigSource {
            path,
            settings: CliSettings::default(),
        };

        assert!(reinitialize(&source, &hot, &ReloadContext::new()).is_err());
        assert_eq!(fetch_body(router).await, "old site");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reloaded_clients_fetch_new_site() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("new")).unwrap();
        std::fs::write(dir.path().join("new/index.html"), "new site").unwrap();
        let path = write_config(dir.path(), "new");

        let context = Arc::new(ReloadContext::new());
        let (channel, mut rx) = Channel::new();
        context.registry().register(channel);

        let hot = HotRouter::new(Router::new().route("/", get(|| async { "old site" })));
        let router = hot.clone().into_router();

        // Behaves like a browser: refetch the page as soon as told to reload
        let browser = tokio::spawn(async move {
            let command = rx.recv().await.unwrap();
            (command, fetch_body(router).await)
        });

        let source = ConfigSource {
            path,
            settings: CliSettings::default(),
        };
        reinitialize(&source, &hot, &context).unwrap();

        let (command, body) = browser.await.unwrap();
        assert_eq!(command, Command::Reload);
        assert!(body.starts_with("new site"), "reloaded into {body:?}");
    }

    #[tokio::test]
    async fn test_rejected_watch_path_does_not_reload_clients() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(relive_config::CONFIG_FILENAME);
        std::fs::write(&path, "[live_reload]\nwatch_path = \"missing\"\n").unwrap();

        let context = ReloadContext::new();
        let (channel, mut rx) = Channel::new();
        context.registry().register(channel);

        let hot = HotRouter::new(Router::new().route("/", get(|| async { "old site" })));
        let router = hot.clone().into_router();
        let source = ConfigSource {
            path,
            settings: CliSettings::default(),
        };

        assert!(matches!(
            reinitialize(&source, &hot, &context),
            Err(ServerError::Watch(_))
        ));
        assert!(rx.try_recv().is_err());
        assert_eq!(fetch_body(router).await, "old site");
    }
}
