//! Error types for the live reload server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::live_reload::BuildError;

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// File watcher could not be started.
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// Build step could not be configured.
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    /// Wrapped response body could not be read.
    #[error("Failed to read response body: {0}")]
    Body(#[from] axum::Error),

    /// Configuration could not be reloaded.
    #[error("{0}")]
    Config(#[from] relive_config::ConfigError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_into_response_is_plaintext_500() {
        let err = ServerError::Body(axum::Error::new(std::io::Error::other("reset")));
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&body).contains("reset"));
    }
}
