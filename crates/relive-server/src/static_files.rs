//! Static file serving.
//!
//! Serves the site directory that live reload wraps. Directories resolve to
//! their `index.html`, content types come from the file extension.

use std::path::Path;

use axum::Router;
use axum::handler::HandlerWithoutStateExt;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tower_http::services::ServeDir;

/// Create router serving files from `root`.
pub(crate) fn static_router(root: &Path) -> Router {
    let serve_dir = ServeDir::new(root).not_found_service(not_found.into_service());
    Router::new().fallback_service(serve_dir)
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}
