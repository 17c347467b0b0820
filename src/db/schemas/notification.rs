//! Notification ledger document schema

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::store::NotificationRecord;
use crate::types::CadenceError;

/// Collection name for notifications
pub const NOTIFICATION_COLLECTION: &str = "notifications";

/// Notification stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NotificationDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Stable identifier handed to clients
    pub notification_id: String,

    pub user_id: String,

    pub title: String,

    pub message: String,

    #[serde(default)]
    pub is_read: bool,

    #[serde(default)]
    pub delivered: bool,

    /// Replay order key
    pub created_at: DateTime,
}

impl From<&NotificationRecord> for NotificationDoc {
    fn from(record: &NotificationRecord) -> Self {
        let created_at = DateTime::from_chrono(record.created_at);
        Self {
            _id: None,
            metadata: Metadata::created(created_at),
            notification_id: record.id.to_string(),
            user_id: record.user_id.clone(),
            title: record.title.clone(),
            message: record.message.clone(),
            is_read: record.is_read,
            delivered: record.delivered,
            created_at,
        }
    }
}

impl TryFrom<NotificationDoc> for NotificationRecord {
    type Error = CadenceError;

    fn try_from(doc: NotificationDoc) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&doc.notification_id).map_err(|e| {
            CadenceError::Database(format!(
                "notification {} has a malformed id: {}",
                doc.notification_id, e
            ))
        })?;

        Ok(NotificationRecord {
            id,
            user_id: doc.user_id,
            title: doc.title,
            message: doc.message,
            is_read: doc.is_read,
            delivered: doc.delivered,
            created_at: doc.created_at.to_chrono(),
        })
    }
}

impl IntoIndexes for NotificationDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "notification_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("notification_id_unique".to_string())
                        .build(),
                ),
            ),
            // Replay and inbox listing
            (
                doc! { "user_id": 1, "delivered": 1, "created_at": 1 },
                Some(
                    IndexOptions::builder()
                        .name("user_delivered_created_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for NotificationDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
