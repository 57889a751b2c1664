//! Router construction.
//!
//! Builds the site router, wraps it with live reload, and holds the active
//! router so it can be swapped when the configuration changes.

use std::sync::{Arc, PoisonError, RwLock};

use axum::Router;
use axum::extract::Request;
use tower::ServiceExt;
use tower::service_fn;
use tower_http::trace::TraceLayer;

use crate::ServerConfig;
use crate::error::ServerError;
use crate::live_reload::{
    BuildStep, CommandBuild, LiveReload, LiveReloadOptions, LoggingSocketHandler, ReloadContext,
};
use crate::static_files;

/// Create the application router.
///
/// Registers the live reload layer with `context`, so calling this again
/// with the same context keeps connected browsers. Connected browsers are
/// not told to reload; that is up to the caller once the router serves.
///
/// # Arguments
///
/// * `config` - Server configuration
/// * `context` - Process-wide live reload context
pub(crate) fn create_router(
    config: &ServerConfig,
    context: &ReloadContext,
) -> Result<Router, ServerError> {
    let site = static_files::static_router(&config.root);

    let router = if config.live_reload_enabled {
        let live_reload = LiveReload::prepare(
            context,
            LoggingSocketHandler,
            live_reload_options(config)?,
        )?;
        live_reload.wrap(site)
    } else {
        site
    };

    Ok(router.layer(TraceLayer::new_for_http()))
}

fn live_reload_options(config: &ServerConfig) -> Result<LiveReloadOptions, ServerError> {
    let build = match &config.build {
        Some(build) => {
            let step = CommandBuild::new(build.command.clone())?.current_dir(&build.cwd);
            Some(Arc::new(step) as Arc<dyn BuildStep>)
        }
        None => None,
    };

    Ok(LiveReloadOptions {
        build,
        watch_path: config.watch_path.clone(),
        ignore: config.ignore.clone(),
    })
}

/// Router handle whose target can be replaced while serving.
#[derive(Clone)]
pub(crate) struct HotRouter {
    current: Arc<RwLock<Router>>,
}

impl HotRouter {
    pub(crate) fn new(router: Router) -> Self {
        Self {
            current: Arc::new(RwLock::new(router)),
        }
    }

    /// Route subsequent requests to `router`.
    pub(crate) fn replace(&self, router: Router) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = router;
    }

    fn current(&self) -> Router {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Router that forwards every request to the current target.
    pub(crate) fn into_router(self) -> Router {
        Router::new().fallback_service(service_fn(move |request: Request| {
            let router = self.current();
            async move { router.oneshot(request).await }
        }))
    }
}
