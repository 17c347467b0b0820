//! User progress document schema
//!
//! Holds the running session index and earned badges for a user.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::store::{Badge, UserProgress};

/// Collection name for user progress
pub const PROGRESS_COLLECTION: &str = "user_progress";

/// Embedded badge
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BadgeDoc {
    pub name: String,
    pub description: String,
    pub date_earned: DateTime,
}

impl From<&Badge> for BadgeDoc {
    fn from(badge: &Badge) -> Self {
        Self {
            name: badge.name.clone(),
            description: badge.description.clone(),
            date_earned: DateTime::from_chrono(badge.earned_at),
        }
    }
}

/// Progress document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ProgressDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub user_id: String,

    #[serde(default = "default_current_session")]
    pub current_session: i32,

    #[serde(default)]
    pub badges: Vec<BadgeDoc>,
}

fn default_current_session() -> i32 {
    1
}

impl From<ProgressDoc> for UserProgress {
    fn from(doc: ProgressDoc) -> Self {
        UserProgress {
            user_id: doc.user_id,
            current_session: doc.current_session.max(1) as u32,
            badges: doc
                .badges
                .into_iter()
                .map(|b| Badge {
                    name: b.name,
                    description: b.description,
                    earned_at: b.date_earned.to_chrono(),
                })
                .collect(),
        }
    }
}

impl IntoIndexes for ProgressDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "user_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("user_id_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for ProgressDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
