//! MongoDB-backed stores

use bson::{doc, DateTime};
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    Badge, NotificationLedger, NotificationRecord, ProgressStore, ScheduleStore, UserProgress,
};
use crate::db::schemas::{
    BadgeDoc, NotificationDoc, ProgressDoc, ScheduleDoc, NOTIFICATION_COLLECTION,
    PROGRESS_COLLECTION, SCHEDULE_COLLECTION,
};
use crate::db::{MongoClient, MongoCollection};
use crate::schedule::SessionSchedule;
use crate::types::{CadenceError, Result};

/// Session schedules in MongoDB
pub struct MongoScheduleStore {
    collection: MongoCollection<ScheduleDoc>,
}

impl MongoScheduleStore {
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        let collection = mongo.collection::<ScheduleDoc>(SCHEDULE_COLLECTION).await?;
        Ok(Self { collection })
    }
}

#[async_trait::async_trait]
impl ScheduleStore for MongoScheduleStore {
    async fn replace_for_user(&self, mut schedule: SessionSchedule) -> Result<SessionSchedule> {
        let removed = self
            .collection
            .delete_many(doc! { "user_id": &schedule.user_id })
            .await?;
        if removed.deleted_count > 0 {
            info!(user_id = %schedule.user_id, "Cleared previous session schedule");
        }

        schedule.revision = 0;
        self.collection.insert_one(ScheduleDoc::from(&schedule)).await?;
        Ok(schedule)
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Option<SessionSchedule>> {
        self.collection
            .find_one(doc! { "user_id": user_id })
            .await?
            .map(SessionSchedule::try_from)
            .transpose()
    }

    async fn find_due(&self, now: chrono::DateTime<Utc>) -> Result<Vec<SessionSchedule>> {
        self.collection
            .find_many(
                doc! { "next_session_date": { "$lte": DateTime::from_chrono(now) } },
                Some(doc! { "next_session_date": 1 }),
            )
            .await?
            .into_iter()
            .map(SessionSchedule::try_from)
            .collect()
    }

    async fn save_if_unchanged(&self, schedule: &SessionSchedule) -> Result<bool> {
        let mut replacement = ScheduleDoc::from(schedule);
        replacement.revision = schedule.revision as i64 + 1;

        let result = self
            .collection
            .replace_one(
                doc! {
                    "user_id": &schedule.user_id,
                    "plan_id": schedule.plan_id.to_string(),
                    "revision": schedule.revision as i64,
                },
                replacement,
            )
            .await?;

        if result.matched_count == 0 {
            debug!(
                user_id = %schedule.user_id,
                plan_id = %schedule.plan_id,
                revision = schedule.revision,
                "Schedule replaced or revision moved on, write rejected"
            );
        }
        Ok(result.matched_count == 1)
    }

    async fn delete_for_user(&self, user_id: &str) -> Result<bool> {
        let result = self
            .collection
            .delete_many(doc! { "user_id": user_id })
            .await?;
        Ok(result.deleted_count > 0)
    }
}

/// Notification ledger in MongoDB
pub struct MongoNotificationLedger {
    collection: MongoCollection<NotificationDoc>,
}

impl MongoNotificationLedger {
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        let collection = mongo
            .collection::<NotificationDoc>(NOTIFICATION_COLLECTION)
            .await?;
        Ok(Self { collection })
    }
}

fn into_records(docs: Vec<NotificationDoc>) -> Result<Vec<NotificationRecord>> {
    docs.into_iter().map(NotificationRecord::try_from).collect()
}

#[async_trait::async_trait]
impl NotificationLedger for MongoNotificationLedger {
    async fn insert(&self, record: NotificationRecord) -> Result<NotificationRecord> {
        self.collection
            .insert_one(NotificationDoc::from(&record))
            .await?;
        Ok(record)
    }

    async fn undelivered_for(&self, user_id: &str) -> Result<Vec<NotificationRecord>> {
        let docs = self
            .collection
            .find_many(
                doc! { "user_id": user_id, "delivered": false },
                Some(doc! { "created_at": 1, "_id": 1 }),
            )
            .await?;
        into_records(docs)
    }

    async fn claim_delivered(&self, id: Uuid) -> Result<bool> {
        let result = self
            .collection
            .update_one(
                doc! { "notification_id": id.to_string(), "delivered": false },
                doc! { "$set": { "delivered": true, "metadata.updated_at": DateTime::now() } },
            )
            .await?;
        Ok(result.modified_count == 1)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<NotificationRecord>> {
        let docs = self
            .collection
            .find_many(
                doc! { "user_id": user_id },
                Some(doc! { "created_at": -1, "_id": -1 }),
            )
            .await?;
        into_records(docs)
    }

    async fn mark_read(&self, user_id: &str, id: Uuid) -> Result<Option<NotificationRecord>> {
        let filter = doc! { "notification_id": id.to_string(), "user_id": user_id };
        let result = self
            .collection
            .update_one(
                filter.clone(),
                doc! { "$set": { "is_read": true, "metadata.updated_at": DateTime::now() } },
            )
            .await?;
        if result.matched_count == 0 {
            return Ok(None);
        }

        self.collection
            .find_one(filter)
            .await?
            .map(NotificationRecord::try_from)
            .transpose()
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<u64> {
        let result = self
            .collection
            .update_many(
                doc! { "user_id": user_id, "is_read": false },
                doc! { "$set": { "is_read": true, "metadata.updated_at": DateTime::now() } },
            )
            .await?;
        Ok(result.modified_count)
    }

    async fn delete(&self, user_id: &str, id: Uuid) -> Result<bool> {
        let result = self
            .collection
            .delete_one(doc! { "notification_id": id.to_string(), "user_id": user_id })
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn clear(&self, user_id: &str) -> Result<u64> {
        let result = self
            .collection
            .delete_many(doc! { "user_id": user_id })
            .await?;
        Ok(result.deleted_count)
    }
}

/// User progress in MongoDB
pub struct MongoProgressStore {
    collection: MongoCollection<ProgressDoc>,
}

impl MongoProgressStore {
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        let collection = mongo.collection::<ProgressDoc>(PROGRESS_COLLECTION).await?;
        Ok(Self { collection })
    }

    /// Make sure a progress document exists for the user
    async fn ensure(&self, user_id: &str) -> Result<()> {
        self.collection
            .upsert_one(
                doc! { "user_id": user_id },
                doc! {
                    "$setOnInsert": {
                        "current_session": 1,
                        "badges": [],
                        "metadata.created_at": DateTime::now(),
                    }
                },
            )
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProgressStore for MongoProgressStore {
    async fn get(&self, user_id: &str) -> Result<Option<UserProgress>> {
        Ok(self
            .collection
            .find_one(doc! { "user_id": user_id })
            .await?
            .map(UserProgress::from))
    }

    async fn set_current_session(&self, user_id: &str, current_session: u32) -> Result<()> {
        self.collection
            .upsert_one(
                doc! { "user_id": user_id },
                doc! {
                    "$set": {
                        "current_session": current_session as i32,
                        "metadata.updated_at": DateTime::now(),
                    },
                    "$setOnInsert": {
                        "badges": [],
                        "metadata.created_at": DateTime::now(),
                    }
                },
            )
            .await?;
        Ok(())
    }

    async fn raise_current_session(&self, user_id: &str, current_session: u32) -> Result<()> {
        self.collection
            .upsert_one(
                doc! { "user_id": user_id },
                doc! {
                    "$max": { "current_session": current_session as i32 },
                    "$set": { "metadata.updated_at": DateTime::now() },
                    "$setOnInsert": {
                        "badges": [],
                        "metadata.created_at": DateTime::now(),
                    }
                },
            )
            .await?;
        Ok(())
    }

    async fn award_badge(&self, user_id: &str, badge: Badge) -> Result<bool> {
        self.ensure(user_id).await?;

        let badge_bson = bson::to_bson(&BadgeDoc::from(&badge))
            .map_err(|e| CadenceError::Database(format!("Failed to encode badge: {}", e)))?;

        // The name guard in the filter makes the push idempotent
        let result = self
            .collection
            .update_one(
                doc! { "user_id": user_id, "badges.name": { "$ne": &badge.name } },
                doc! {
                    "$push": { "badges": badge_bson },
                    "$set": { "metadata.updated_at": DateTime::now() },
                },
            )
            .await?;
        Ok(result.modified_count == 1)
    }
}
