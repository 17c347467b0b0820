//! Durable record stores
//!
//! Traits for the three collections the scheduler owns, with an in-memory
//! implementation (tests, dev fallback) and a MongoDB implementation.

pub mod memory;
pub mod mongo;
pub mod records;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::schedule::SessionSchedule;
use crate::types::Result;

pub use memory::{MemoryNotificationLedger, MemoryProgressStore, MemoryScheduleStore};
pub use mongo::{MongoNotificationLedger, MongoProgressStore, MongoScheduleStore};
pub use records::{
    Badge, NotificationRecord, UserProgress, BADGE_COMPLETION, BADGE_FIRST_ASSESSMENT,
    BADGE_HALFWAY,
};

/// Storage for session schedules, at most one per user
#[async_trait::async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Delete any schedule the user has and store this one at revision 0
    async fn replace_for_user(&self, schedule: SessionSchedule) -> Result<SessionSchedule>;

    async fn find_by_user(&self, user_id: &str) -> Result<Option<SessionSchedule>>;

    /// Schedules whose `next_session_date <= now`
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<SessionSchedule>>;

    /// Write the schedule back if the stored plan is still `schedule.plan_id`
    /// at `schedule.revision`, bumping the stored revision by one.
    ///
    /// Returns `false` when another writer got there first or the plan was
    /// reinstalled in the meantime.
    async fn save_if_unchanged(&self, schedule: &SessionSchedule) -> Result<bool>;

    async fn delete_for_user(&self, user_id: &str) -> Result<bool>;
}

/// Per-user notification ledger
#[async_trait::async_trait]
pub trait NotificationLedger: Send + Sync {
    async fn insert(&self, record: NotificationRecord) -> Result<NotificationRecord>;

    /// Undelivered notifications for a user, oldest first
    async fn undelivered_for(&self, user_id: &str) -> Result<Vec<NotificationRecord>>;

    /// Flip `delivered` from false to true.
    ///
    /// Returns `true` only for the caller that performed the flip.
    async fn claim_delivered(&self, id: Uuid) -> Result<bool>;

    /// All notifications for a user, newest first
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<NotificationRecord>>;

    async fn mark_read(&self, user_id: &str, id: Uuid) -> Result<Option<NotificationRecord>>;

    async fn mark_all_read(&self, user_id: &str) -> Result<u64>;

    async fn delete(&self, user_id: &str, id: Uuid) -> Result<bool>;

    async fn clear(&self, user_id: &str) -> Result<u64>;
}

/// Per-user progress counter and badges
#[async_trait::async_trait]
pub trait ProgressStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<UserProgress>>;

    /// Upsert the running session index, overwriting whatever is stored
    async fn set_current_session(&self, user_id: &str, current_session: u32) -> Result<()>;

    /// Upsert the running session index, never lowering a stored value
    async fn raise_current_session(&self, user_id: &str, current_session: u32) -> Result<()>;

    /// Append a badge unless one with the same name exists.
    ///
    /// Returns whether the badge was newly awarded.
    async fn award_badge(&self, user_id: &str, badge: Badge) -> Result<bool>;
}
