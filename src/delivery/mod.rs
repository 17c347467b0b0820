//! Notification delivery
//!
//! Every notification is written to the ledger before any push is attempted,
//! so a crash between the two can only lose a push, never the notification.
//! Anything not pushed is replayed, oldest first, the next time the user
//! registers a live channel.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::presence::{ChannelHandle, PresenceStore, NOTIFICATION_EVENT};
use crate::store::{NotificationLedger, NotificationRecord};
use crate::types::Result;

/// Outcome of a replay on connect
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    /// Undelivered notifications found
    pub pending: usize,
    /// Notifications this connection claimed and pushed
    pub replayed: usize,
    /// Claimed notifications whose push failed
    pub push_failures: usize,
}

/// Persists notifications and pushes them to live users
pub struct DeliveryCoordinator {
    ledger: Arc<dyn NotificationLedger>,
    presence: Arc<dyn PresenceStore>,
    clock: Arc<dyn Clock>,
}

impl DeliveryCoordinator {
    pub fn new(
        ledger: Arc<dyn NotificationLedger>,
        presence: Arc<dyn PresenceStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            presence,
            clock,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn NotificationLedger> {
        &self.ledger
    }

    pub fn presence(&self) -> &Arc<dyn PresenceStore> {
        &self.presence
    }

    /// Persist a notification and push it if the user is live.
    ///
    /// Ledger failures propagate. Push failures are logged and swallowed; the
    /// record stays marked delivered because the push was attempted.
    pub async fn deliver(
        &self,
        user_id: &str,
        title: &str,
        message: &str,
    ) -> Result<NotificationRecord> {
        let live = self.presence.lookup(user_id).await;

        let record = NotificationRecord::new(
            user_id,
            title,
            message,
            live.is_some(),
            self.clock.now(),
        );
        let record = self.ledger.insert(record).await?;

        match live {
            Some(handle) => {
                if let Err(e) = handle.push(NOTIFICATION_EVENT, record.to_push_payload()) {
                    warn!(
                        user_id = %user_id,
                        notification_id = %record.id,
                        error = %e,
                        "Live push failed, notification kept in ledger"
                    );
                } else {
                    debug!(user_id = %user_id, notification_id = %record.id, "Notification pushed");
                }
            }
            None => {
                debug!(
                    user_id = %user_id,
                    notification_id = %record.id,
                    "User offline, notification saved for replay"
                );
            }
        }

        Ok(record)
    }

    /// [`deliver`](Self::deliver) for callers whose own outcome must not depend
    /// on the notification. Errors are logged and dropped.
    pub async fn deliver_best_effort(
        &self,
        user_id: &str,
        title: &str,
        message: &str,
    ) -> Option<NotificationRecord> {
        match self.deliver(user_id, title, message).await {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(user_id = %user_id, title = %title, error = %e, "Notification delivery failed");
                None
            }
        }
    }

    /// Register a live channel and replay everything the user missed.
    ///
    /// The backlog is pushed before the channel is registered, so nothing
    /// delivered live can overtake it. Once registered, the ledger is drained
    /// again until it reports nothing pending, which picks up rows written by
    /// a `deliver` that saw the user offline in between. Each notification is
    /// claimed before it is pushed, so two racing connections for the same
    /// user never both replay it.
    pub async fn on_connect(&self, user_id: &str, handle: ChannelHandle) -> Result<ReplaySummary> {
        let mut summary = ReplaySummary::default();

        let backlog = self.ledger.undelivered_for(user_id).await?;
        summary.pending += backlog.len();
        self.replay(user_id, &handle, backlog, &mut summary).await?;

        self.presence.register(user_id, handle.clone()).await;

        loop {
            let pending = self.ledger.undelivered_for(user_id).await?;
            if pending.is_empty() {
                break;
            }
            summary.pending += pending.len();
            self.replay(user_id, &handle, pending, &mut summary).await?;
        }

        info!(
            user_id = %user_id,
            connection = handle.id().0,
            replayed = summary.replayed,
            "User connected"
        );
        Ok(summary)
    }

    async fn replay(
        &self,
        user_id: &str,
        handle: &ChannelHandle,
        pending: Vec<NotificationRecord>,
        summary: &mut ReplaySummary,
    ) -> Result<()> {
        for mut record in pending {
            if !self.ledger.claim_delivered(record.id).await? {
                continue;
            }
            record.delivered = true;
            summary.replayed += 1;

            if let Err(e) = handle.push(NOTIFICATION_EVENT, record.to_push_payload()) {
                summary.push_failures += 1;
                warn!(
                    user_id = %user_id,
                    notification_id = %record.id,
                    error = %e,
                    "Replay push failed"
                );
            }
        }
        Ok(())
    }

    /// Drop the channel from presence if it is still the user's live one
    pub async fn on_disconnect(&self, handle: &ChannelHandle) {
        if let Some(user_id) = self.presence.unregister(handle).await {
            info!(user_id = %user_id, connection = handle.id().0, "User disconnected");
        }
    }
}
