//! Connection registry.
//!
//! Tracks every open push channel so commands can be broadcast to all
//! connected browsers. The registry lives in a [`ReloadContext`] owned by the
//! host process, so it survives re-creation of the live reload layer itself.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::sync::mpsc;
use uuid::Uuid;

use super::command::Command;

/// Identity of a push channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelId(Uuid);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Returned when sending to a channel whose socket has gone away.
#[derive(Debug, thiserror::Error)]
#[error("push channel {0} is closed")]
pub struct ChannelClosed(pub ChannelId);

/// An open push channel to one browser.
///
/// Cloning yields another handle to the same channel.
#[derive(Clone, Debug)]
pub struct Channel {
    id: ChannelId,
    sender: mpsc::UnboundedSender<Command>,
}

impl Channel {
    /// Create a channel and the receiver that feeds its socket.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let channel = Self {
            id: ChannelId(Uuid::new_v4()),
            sender,
        };
        (channel, receiver)
    }

    /// Channel identity.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Queue a command for the browser. Never blocks.
    pub fn send(&self, command: Command) -> Result<(), ChannelClosed> {
        self.sender.send(command).map_err(|_| ChannelClosed(self.id))
    }

    /// Whether the receiving side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Process-wide collection of open push channels, in registration order.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: Mutex<Vec<Channel>>,
}

impl ChannelRegistry {
    /// Add a channel. Registering the same channel twice is a no-op.
    pub fn register(&self, channel: Channel) {
        let mut channels = self.lock();
        if channels.iter().all(|c| c.id != channel.id) {
            channels.push(channel);
        }
    }

    /// Remove every entry for the given channel.
    ///
    /// Returns `true` if anything was removed.
    pub fn unregister(&self, id: ChannelId) -> bool {
        let mut channels = self.lock();
        let before = channels.len();
        channels.retain(|c| c.id != id);
        channels.len() != before
    }

    /// Snapshot of the registered channels.
    pub fn all(&self) -> Vec<Channel> {
        self.lock().clone()
    }

    /// Number of registered channels.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no channel is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Send `command` to every registered channel.
    ///
    /// Closed channels are skipped without interrupting the broadcast.
    /// Returns the number of channels the command was delivered to.
    pub fn broadcast(&self, command: Command) -> usize {
        let mut delivered = 0;
        for channel in self.all() {
            match channel.send(command) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::debug!(error = %e, %command, "Skipped closed channel"),
            }
        }
        tracing::debug!(%command, delivered, "Broadcast sent");
        delivered
    }

    // No critical section panics, so a poisoned lock still holds a valid list.
    fn lock(&self) -> MutexGuard<'_, Vec<Channel>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Long-lived application context holding the connection registry.
///
/// Create one per host process and pass it to every
/// [`LiveReload`](super::LiveReload) construction; repeated construction then
/// reuses the same registry instead of losing open connections.
#[derive(Debug, Default)]
pub struct ReloadContext {
    registry: OnceLock<Arc<ChannelRegistry>>,
}

impl ReloadContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the registry, creating it on first use.
    pub fn registry(&self) -> Arc<ChannelRegistry> {
        Arc::clone(self.registry.get_or_init(Arc::default))
    }
}
