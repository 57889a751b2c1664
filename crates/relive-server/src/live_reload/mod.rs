//! Live reload layer.
//!
//! Wraps an existing axum service so that connected browsers reload when
//! watched files change:
//!
//! - `/_live-reload` upgrades to a WebSocket push channel
//! - `/_live-reload.js` serves the reconnecting client script
//! - HTML responses from the wrapped service get the script tag appended
//!
//! Open channels live in the [`ChannelRegistry`] of a [`ReloadContext`].
//! Building a new [`LiveReload`] from the same context keeps existing
//! channels and immediately tells them to reload.

mod build;
mod classifier;
mod command;
mod interceptor;
mod manager;
mod registry;
mod websocket;

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::extract::Request;
use axum::middleware;
use axum::response::IntoResponse;
use tower::Service;

pub use build::{BuildError, BuildStep, CommandBuild};
pub use classifier::{ChangeEvent, ChangeKind, Classification, classify};
pub use command::Command;
pub use interceptor::{CLIENT_SCRIPT, RELOAD_PATH, SCRIPT_PATH, SCRIPT_TAG};
pub use registry::{Channel, ChannelClosed, ChannelId, ChannelRegistry, ReloadContext};
pub use websocket::{LoggingSocketHandler, NoopSocketHandler, SocketHandler};

use crate::error::ServerError;
use manager::ChangeWatcher;
use websocket::SocketHooks;

/// Live reload options.
#[derive(Clone, Default)]
pub struct LiveReloadOptions {
    /// Build step run at startup and before every change broadcast.
    pub build: Option<Arc<dyn BuildStep>>,
    /// Directory to watch. Without one, only manual broadcasts happen.
    pub watch_path: Option<PathBuf>,
    /// Glob patterns, relative to `watch_path`, whose changes are ignored.
    pub ignore: Vec<String>,
}

/// Live reload layer bound to a [`ReloadContext`].
///
/// Cheap to clone; clones share the registry and the file watcher. The
/// watcher stops when the last clone is dropped.
#[derive(Clone)]
pub struct LiveReload {
    registry: Arc<ChannelRegistry>,
    hooks: SocketHooks,
    watcher: Option<Arc<ChangeWatcher>>,
}

impl LiveReload {
    /// Create a live reload layer without application socket hooks.
    ///
    /// # Panics
    ///
    /// Panics if a build step or watch path is configured and this is called
    /// outside a Tokio runtime.
    pub fn new(context: &ReloadContext, options: LiveReloadOptions) -> Result<Self, ServerError> {
        Self::with_socket_handler(context, NoopSocketHandler, options)
    }

    /// Create a live reload layer that also notifies `handler` of socket
    /// events.
    ///
    /// If the context already holds open channels, they are told to reload
    /// once the layer is fully set up. Nothing is sent when setup fails.
    ///
    /// # Panics
    ///
    /// Panics if a build step or watch path is configured and this is called
    /// outside a Tokio runtime.
    pub fn with_socket_handler(
        context: &ReloadContext,
        handler: impl SocketHandler + 'static,
        options: LiveReloadOptions,
    ) -> Result<Self, ServerError> {
        let live_reload = Self::prepare(context, handler, options)?;

        if !live_reload.registry.is_empty() {
            let delivered = live_reload.reload();
            tracing::info!(delivered, "Live reload re-initialized, reloading connected clients");
        }

        Ok(live_reload)
    }

    /// Create a live reload layer without telling open channels to reload.
    ///
    /// For callers that install the returned layer first and call
    /// [`LiveReload::reload`] once it is serving.
    ///
    /// # Panics
    ///
    /// Panics if a build step or watch path is configured and this is called
    /// outside a Tokio runtime.
    pub fn prepare(
        context: &ReloadContext,
        handler: impl SocketHandler + 'static,
        options: LiveReloadOptions,
    ) -> Result<Self, ServerError> {
        let registry = context.registry();

        let watcher = match options.watch_path {
            Some(watch_path) => {
                let mut watcher = ChangeWatcher::new(
                    watch_path,
                    &options.ignore,
                    Arc::clone(&registry),
                    options.build.clone(),
                );
                watcher.start()?;
                Some(Arc::new(watcher))
            }
            None => None,
        };

        if let Some(build) = options.build {
            tokio::spawn(async move {
                if let Err(e) = build.build().await {
                    tracing::error!(error = %e, "Initial build failed");
                }
            });
        }

        let hooks = SocketHooks::new(Arc::clone(&registry), Arc::new(handler));

        Ok(Self {
            registry,
            hooks,
            watcher,
        })
    }

    /// The registry this layer broadcasts to.
    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Whether a file watcher is running.
    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    /// Send `command` to every connected browser.
    ///
    /// Returns the number of channels it was delivered to.
    pub fn broadcast(&self, command: Command) -> usize {
        self.registry.broadcast(command)
    }

    /// Tell every connected browser to reload.
    pub fn reload(&self) -> usize {
        self.broadcast(Command::Reload)
    }

    /// Wrap `service` with live reload request interception.
    pub fn wrap<T>(&self, service: T) -> Router
    where
        T: Service<Request, Error = Infallible> + Clone + Send + Sync + 'static,
        T::Response: IntoResponse,
        T::Future: Send + 'static,
    {
        Router::new()
            .fallback_service(service)
            .layer(middleware::from_fn_with_state(
                self.clone(),
                interceptor::intercept,
            ))
    }
}
