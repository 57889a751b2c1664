//! Live reload for axum servers.
//!
//! This crate wraps an existing axum service so that connected browsers
//! refresh whenever watched files change:
//!
//! - HTML responses get a `<script src="/_live-reload.js"></script>` tag
//! - The script keeps a WebSocket open on `/_live-reload` and reconnects
//!   every second while the server is away
//! - File changes broadcast `reload`, or `reload-css` for stylesheets,
//!   after an optional build step has finished
//!
//! It also ships a small development file server built on the same layer.
//!
//! # Quick Start
//!
//! ```ignore
//! use axum::Router;
//! use axum::routing::get;
//! use axum::response::Html;
//! use relive_server::{LiveReload, LiveReloadOptions, ReloadContext};
//!
//! #[tokio::main]
//! async fn main() {
//!     let context = ReloadContext::new();
//!     let live_reload = LiveReload::new(
//!         &context,
//!         LiveReloadOptions {
//!             watch_path: Some("public".into()),
//!             ..Default::default()
//!         },
//!     )
//!     .unwrap();
//!
//!     let site = Router::new().route("/", get(|| async { Html("<div>hello world!</div>") }));
//!     let app = live_reload.wrap(site);
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8888").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Browser ──HTTP──► LiveReload::wrap (interceptor)
//!    ▲                   │
//!    │                   ├─► /_live-reload     ──► WebSocket ──► ChannelRegistry
//!    │                   ├─► /_live-reload.js  ──► client script
//!    │                   └─► everything else   ──► wrapped service (+ script tag)
//!    │
//!    └──── reload / reload-css ◄── ChannelRegistry ◄── build ◄── notify
//! ```

mod app;
mod error;
mod live_reload;
mod reconfigure;
mod static_files;

use std::path::PathBuf;
use std::sync::Arc;

pub use error::ServerError;
pub use live_reload::{
    BuildError, BuildStep, CLIENT_SCRIPT, ChangeEvent, ChangeKind, Channel, ChannelClosed,
    ChannelId, ChannelRegistry, Classification, Command, CommandBuild, LiveReload,
    LiveReloadOptions, LoggingSocketHandler, NoopSocketHandler, RELOAD_PATH, ReloadContext,
    SCRIPT_PATH, SCRIPT_TAG, SocketHandler, classify,
};
pub use reconfigure::ConfigSource;
pub use relive_config::BuildConfig;

use app::HotRouter;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Directory served over HTTP.
    pub root: PathBuf,
    /// Install the live reload layer.
    pub live_reload_enabled: bool,
    /// Directory to watch (`None` disables change-driven reloads).
    pub watch_path: Option<PathBuf>,
    /// Glob patterns, relative to `watch_path`, to ignore.
    pub ignore: Vec<String>,
    /// Build step run before reload broadcasts (`None` disables building).
    pub build: Option<BuildConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8888,
            root: PathBuf::from("."),
            live_reload_enabled: true,
            watch_path: Some(PathBuf::from(".")),
            ignore: Vec::new(),
            build: None,
        }
    }
}

/// Run the development server.
///
/// # Arguments
///
/// * `config` - Server configuration
/// * `source` - Config file to watch for re-initialization, if any
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(
    config: ServerConfig,
    source: Option<ConfigSource>,
) -> Result<(), ServerError> {
    let context = Arc::new(ReloadContext::new());
    let hot = HotRouter::new(app::create_router(&config, &context)?);

    let _config_watcher = source
        .map(|source| reconfigure::watch_config(source, hot.clone(), Arc::clone(&context)))
        .transpose()?;

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    tracing::info!(address = %listener.local_addr()?, "Starting server");

    axum::serve(listener, hot.into_router())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wait for shutdown signal (Ctrl-C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}

/// Create server configuration from relive config.
#[must_use]
pub fn server_config_from_config(config: &relive_config::Config) -> ServerConfig {
    ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        root: config.site_resolved.root.clone(),
        live_reload_enabled: config.live_reload_resolved.enabled,
        watch_path: config.live_reload_resolved.watch_path.clone(),
        ignore: config.live_reload_resolved.ignore.clone(),
        build: config.build_resolved.clone(),
    }
}
