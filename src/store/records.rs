//! Records kept by the stores besides schedules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Badge names awarded by the scheduler
pub const BADGE_FIRST_ASSESSMENT: &str = "First Assessment";
pub const BADGE_HALFWAY: &str = "Halfway Hero";
pub const BADGE_COMPLETION: &str = "Warrior";

/// One ledger entry
///
/// Title and message never change after creation; only `is_read` and
/// `delivered` flip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    /// Pushed over a live channel, at creation or on a later replay
    pub delivered: bool,
    pub created_at: DateTime<Utc>,
}

impl NotificationRecord {
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
        delivered: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            title: title.into(),
            message: message.into(),
            is_read: false,
            delivered,
            created_at,
        }
    }

    /// Payload pushed over the live channel
    pub fn to_push_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "title": self.title,
            "message": self.message,
            "time": self.created_at,
            "isRead": self.is_read,
        })
    }
}

/// Achievement attached to a user's progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    pub name: String,
    pub description: String,
    pub earned_at: DateTime<Utc>,
}

impl Badge {
    pub fn new(name: &str, description: &str, earned_at: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            earned_at,
        }
    }
}

/// Per-user therapy progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    pub user_id: String,
    /// Index of the session the user is on (completed + 1)
    pub current_session: u32,
    pub badges: Vec<Badge>,
}

impl UserProgress {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            current_session: 1,
            badges: Vec::new(),
        }
    }

    pub fn has_badge(&self, name: &str) -> bool {
        self.badges.iter().any(|b| b.name == name)
    }
}
