//! Request interception.
//!
//! Every request to a wrapped service passes through [`intercept`]. Two
//! reserved paths are answered here and never reach the wrapped service;
//! everything else is delegated, and HTML responses get the client script
//! tag appended.
//!
//! The tag is appended to the raw body bytes. No HTML parsing happens, so
//! malformed documents are handled the same as well-formed ones.

use axum::body::Body;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::LiveReload;
use super::websocket::{self, SocketHooks};
use crate::error::ServerError;

/// Path of the push channel WebSocket endpoint.
pub const RELOAD_PATH: &str = "/_live-reload";

/// Path the client script is served from.
pub const SCRIPT_PATH: &str = "/_live-reload.js";

/// Markup appended to HTML responses.
pub const SCRIPT_TAG: &str = r#"<script src="/_live-reload.js"></script>"#;

/// Browser-side reconnecting client.
pub const CLIENT_SCRIPT: &str = include_str!("../../assets/live-reload.js");

const SCRIPT_CONTENT_TYPE: &str = "text/javascript; charset=utf-8";
const UPGRADE_FAILED: &str = "Failed upgrading to websocket connection.";

/// Middleware entry point.
pub(crate) async fn intercept(
    State(live_reload): State<LiveReload>,
    request: Request,
    next: Next,
) -> Response {
    if request.uri().path() == RELOAD_PATH {
        return upgrade(live_reload.hooks.clone(), request).await;
    }
    if request.uri().path() == SCRIPT_PATH {
        return client_script();
    }

    // HEAD answers must keep describing the GET body
    let is_head = request.method() == Method::HEAD;
    let response = next.run(request).await;
    if is_head {
        return response;
    }
    inject_script(response).await
}

/// Upgrade the request to a push channel, or answer 400.
async fn upgrade(hooks: SocketHooks, request: Request) -> Response {
    let (mut parts, _body) = request.into_parts();
    match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(ws) => ws
            .on_failed_upgrade(|e: axum::Error| {
                tracing::warn!(error = %e, "Live reload upgrade failed");
            })
            .on_upgrade(move |socket| websocket::handle_socket(socket, hooks)),
        Err(rejection) => {
            tracing::warn!(error = %rejection, "Live reload upgrade rejected");
            (StatusCode::BAD_REQUEST, UPGRADE_FAILED).into_response()
        }
    }
}

fn client_script() -> Response {
    ([(header::CONTENT_TYPE, SCRIPT_CONTENT_TYPE)], CLIENT_SCRIPT).into_response()
}

/// Append [`SCRIPT_TAG`] to an HTML response body.
///
/// Non-HTML and content-encoded responses are returned untouched, so binary
/// and streaming bodies are never buffered. So are responses that carry no
/// complete document (1xx, 204, 206, 304). Status and headers are kept,
/// except `Content-Length`, which no longer matches the body.
pub(crate) async fn inject_script(response: Response) -> Response {
    if !is_complete_document(response.status())
        || !is_html(response.headers())
        || is_encoded(response.headers())
    {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let html = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(html) => html,
        Err(e) => return ServerError::Body(e).into_response(),
    };

    let mut rewritten = Vec::with_capacity(html.len() + SCRIPT_TAG.len());
    rewritten.extend_from_slice(&html);
    rewritten.extend_from_slice(SCRIPT_TAG.as_bytes());

    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(rewritten))
}

fn is_complete_document(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::PARTIAL_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/html"))
}

fn is_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_ENCODING)
        .is_some_and(|v| v.as_bytes() != b"identity")
}
