//! Presence registry
//!
//! Tracks which users hold a live channel. Process-local: after a restart
//! every user is offline until they reconnect. Only the most recent
//! registration for a user is live.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::types::{CadenceError, Result};

/// Event name for notification pushes
pub const NOTIFICATION_EVENT: &str = "notification";

/// Identifier of one live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId(pub u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Frame queued for a live channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    #[serde(rename = "type")]
    pub event: String,
    pub data: serde_json::Value,
}

/// Write side of a live channel
///
/// Pushes are queued on an unbounded channel drained by the socket's writer
/// loop, so a push never blocks the caller.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<PushMessage>,
}

impl ChannelHandle {
    /// Create a handle and the receiver its socket task drains
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PushMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: ConnectionId::next(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue an event on this channel
    pub fn push(&self, event: &str, data: serde_json::Value) -> Result<()> {
        self.tx
            .send(PushMessage {
                event: event.to_string(),
                data,
            })
            .map_err(|_| CadenceError::Push(format!("connection {} is closed", self.id.0)))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Interface to the presence map, so a shared store can replace the local one
#[async_trait::async_trait]
pub trait PresenceStore: Send + Sync {
    /// Make `handle` the live channel for `user_id`, returning the handle it replaced
    async fn register(&self, user_id: &str, handle: ChannelHandle) -> Option<ChannelHandle>;

    /// Remove the entry only if it still points at this exact handle.
    ///
    /// Returns the user the handle was registered for.
    async fn unregister(&self, handle: &ChannelHandle) -> Option<String>;

    async fn lookup(&self, user_id: &str) -> Option<ChannelHandle>;

    async fn online_count(&self) -> usize;

    async fn is_online(&self, user_id: &str) -> bool {
        self.lookup(user_id).await.is_some()
    }
}

/// In-process presence map
#[derive(Default)]
pub struct LocalPresence {
    by_user: DashMap<String, ChannelHandle>,
    by_connection: DashMap<ConnectionId, String>,
}

impl LocalPresence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<dyn PresenceStore> {
        Arc::new(Self::new())
    }
}

#[async_trait::async_trait]
impl PresenceStore for LocalPresence {
    async fn register(&self, user_id: &str, handle: ChannelHandle) -> Option<ChannelHandle> {
        let connection = handle.id();

        // A connection re-registering as someone else leaves its old entry
        if let Some(previous_user) = self.by_connection.insert(connection, user_id.to_string()) {
            if previous_user != user_id {
                self.by_user
                    .remove_if(&previous_user, |_, h| h.id() == connection);
            }
        }

        let replaced = self.by_user.insert(user_id.to_string(), handle);
        if let Some(ref old) = replaced {
            if old.id() != connection {
                self.by_connection.remove(&old.id());
            }
        }

        debug!(
            user_id = %user_id,
            connection = connection.0,
            online = self.by_user.len(),
            "Presence registered"
        );
        replaced
    }

    async fn unregister(&self, handle: &ChannelHandle) -> Option<String> {
        let (_, user_id) = self.by_connection.remove(&handle.id())?;
        let removed = self
            .by_user
            .remove_if(&user_id, |_, h| h.id() == handle.id())
            .is_some();

        debug!(
            user_id = %user_id,
            connection = handle.id().0,
            removed,
            online = self.by_user.len(),
            "Presence unregistered"
        );
        Some(user_id)
    }

    async fn lookup(&self, user_id: &str) -> Option<ChannelHandle> {
        self.by_user.get(user_id).map(|entry| entry.clone())
    }

    async fn online_count(&self) -> usize {
        self.by_user.len()
    }
}
