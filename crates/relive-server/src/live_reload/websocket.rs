//! WebSocket handling for live reload.
//!
//! Runs one push channel per upgraded connection and keeps the connection
//! registry in step with socket open and close events.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::{SinkExt, StreamExt};

use super::registry::{Channel, ChannelRegistry};

/// Application hooks for push channel socket events.
///
/// Every method defaults to doing nothing. The live reload layer wraps
/// `open` and `close` to keep its registry current; `message` is forwarded
/// untouched.
#[async_trait]
pub trait SocketHandler: Send + Sync {
    /// A channel was opened. It is already registered when this runs.
    async fn open(&self, _channel: &Channel) {}

    /// A channel was closed. It is already unregistered when this runs.
    async fn close(&self, _channel: &Channel, _code: u16, _reason: &str) {}

    /// The browser sent a frame other than a close frame.
    async fn message(&self, _channel: &Channel, _message: Message) {}
}

/// Socket handler with no application behavior.
#[derive(Debug, Default)]
pub struct NoopSocketHandler;

impl SocketHandler for NoopSocketHandler {}

/// Socket handler that logs channel lifecycle events.
#[derive(Debug, Default)]
pub struct LoggingSocketHandler;

#[async_trait]
impl SocketHandler for LoggingSocketHandler {
    async fn open(&self, channel: &Channel) {
        tracing::info!(channel = %channel.id(), "Live reload client connected");
    }

    async fn close(&self, channel: &Channel, code: u16, reason: &str) {
        tracing::info!(channel = %channel.id(), code, reason, "Live reload client disconnected");
    }
}

/// Registry-maintaining wrapper around an application [`SocketHandler`].
#[derive(Clone)]
pub(crate) struct SocketHooks {
    registry: Arc<ChannelRegistry>,
    handler: Arc<dyn SocketHandler>,
}

impl SocketHooks {
    pub(crate) fn new(registry: Arc<ChannelRegistry>, handler: Arc<dyn SocketHandler>) -> Self {
        Self { registry, handler }
    }

    /// Register the channel, then run the application hook.
    pub(crate) async fn open(&self, channel: &Channel) {
        self.registry.register(channel.clone());
        self.handler.open(channel).await;
    }

    /// Unregister the channel, then run the application hook.
    pub(crate) async fn close(&self, channel: &Channel, code: u16, reason: &str) {
        self.registry.unregister(channel.id());
        self.handler.close(channel, code, reason).await;
    }

    pub(crate) async fn message(&self, channel: &Channel, message: Message) {
        self.handler.message(channel, message).await;
    }
}

/// Handle an established WebSocket connection.
pub(crate) async fn handle_socket(socket: WebSocket, hooks: SocketHooks) {
    let (mut sink, mut stream) = socket.split();
    let (channel, mut commands) = Channel::new();

    hooks.open(&channel).await;

    // Forward commands to the client until either side goes away
    let forward = tokio::spawn(async move {
        while let Some(command) = commands.recv().await {
            if sink.send(Message::Text(command.as_str().into())).await.is_err() {
                break;
            }
        }
    });

    let (code, reason) = loop {
        match stream.next().await {
            Some(Ok(Message::Close(frame))) => break close_details(frame),
            Some(Ok(message)) => hooks.message(&channel, message).await,
            Some(Err(e)) => {
                tracing::debug!(channel = %channel.id(), error = %e, "WebSocket error");
                break (close_code::ABNORMAL, String::new());
            }
            None => break (close_code::ABNORMAL, String::new()),
        }
    };

    hooks.close(&channel, code, &reason).await;
    forward.abort();
}

fn close_details(frame: Option<CloseFrame>) -> (u16, String) {
    frame.map_or_else(
        || (close_code::STATUS, String::new()),
        |frame| (frame.code, frame.reason.as_str().to_owned()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::live_reload::command::Command;

    /// Records hook calls and whether the channel was registered at call time.
    struct RecordingHandler {
        registry: Arc<ChannelRegistry>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SocketHandler for RecordingHandler {
        async fn open(&self, channel: &Channel) {
            // A hook that broadcasts immediately must reach its own channel
            let delivered = self.registry.broadcast(Command::Reload);
            let registered = self.registry.all().iter().any(|c| c.id() == channel.id());
            self.calls
                .lock()
                .unwrap()
                .push(format!("open registered={registered} delivered={delivered}"));
        }

        async fn close(&self, channel: &Channel, code: u16, reason: &str) {
            let registered = self.registry.all().iter().any(|c| c.id() == channel.id());
            self.calls
                .lock()
                .unwrap()
                .push(format!("close {code} {reason} registered={registered}"));
        }

        async fn message(&self, _channel: &Channel, message: Message) {
            if let Message::Text(text) = message {
                self.calls.lock().unwrap().push(format!("message {}", text.as_str()));
            }
        }
    }

    fn hooks_with_recorder() -> (SocketHooks, Arc<RecordingHandler>, Arc<ChannelRegistry>) {
        let registry = Arc::new(ChannelRegistry::default());
        let handler = Arc::new(RecordingHandler {
            registry: Arc::clone(&registry),
            calls: Mutex::new(Vec::new()),
        });
        let hooks = SocketHooks::new(Arc::clone(&registry), Arc::clone(&handler) as _);
        (hooks, handler, registry)
    }

    #[tokio::test]
    async fn test_open_registers_before_application_hook() {
        let (hooks, handler, registry) = hooks_with_recorder();
        let (channel, mut rx) = Channel::new();

        hooks.open(&channel).await;

        assert_eq!(registry.len(), 1);
        assert_eq!(rx.try_recv().unwrap(), Command::Reload);
        assert_eq!(
            *handler.calls.lock().unwrap(),
            vec!["open registered=true delivered=1".to_owned()]
        );
    }

    #[tokio::test]
    async fn test_close_unregisters_before_application_hook() {
        let (hooks, handler, registry) = hooks_with_recorder();
        let (channel, _rx) = Channel::new();
        hooks.open(&channel).await;

        hooks.close(&channel, 1001, "going away").await;

        assert!(registry.is_empty());
        assert_eq!(
            handler.calls.lock().unwrap().last().unwrap(),
            "close 1001 going away registered=false"
        );
    }

    #[tokio::test]
    async fn test_message_passes_through() {
        let (hooks, handler, _registry) = hooks_with_recorder();
        let (channel, _rx) = Channel::new();

        hooks.message(&channel, Message::Text("ping".into())).await;

        assert_eq!(*handler.calls.lock().unwrap(), vec!["message ping".to_owned()]);
    }

    #[tokio::test]
    async fn test_default_handler_hooks_are_noops() {
        let registry = Arc::new(ChannelRegistry::default());
        let hooks = SocketHooks::new(Arc::clone(&registry), Arc::new(NoopSocketHandler));
        let (channel, _rx) = Channel::new();

        hooks.open(&channel).await;
        hooks.message(&channel, Message::Text("hello".into())).await;
        assert_eq!(registry.len(), 1);

        hooks.close(&channel, close_code::NORMAL, "").await;
        assert!(registry.is_empty());
    }

    #[test]
    fn test_close_details() {
        assert_eq!(close_details(None), (close_code::STATUS, String::new()));
        let frame = CloseFrame {
            code: close_code::AWAY,
            reason: "tab closed".into(),
        };
        assert_eq!(close_details(Some(frame)), (1001, "tab closed".to_owned()));
    }
}
