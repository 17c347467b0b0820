//! In-memory stores
//!
//! Used by tests and as the dev-mode fallback when MongoDB is unreachable.
//! Contents are lost on restart.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    Badge, NotificationLedger, NotificationRecord, ProgressStore, ScheduleStore, UserProgress,
};
use crate::schedule::SessionSchedule;
use crate::types::Result;

/// Schedules keyed by user id
#[derive(Default)]
pub struct MemoryScheduleStore {
    schedules: DashMap<String, SessionSchedule>,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.schedules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schedules.is_empty()
    }
}

#[async_trait::async_trait]
impl ScheduleStore for MemoryScheduleStore {
    async fn replace_for_user(&self, mut schedule: SessionSchedule) -> Result<SessionSchedule> {
        schedule.revision = 0;
        self.schedules
            .insert(schedule.user_id.clone(), schedule.clone());
        Ok(schedule)
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Option<SessionSchedule>> {
        Ok(self.schedules.get(user_id).map(|entry| entry.clone()))
    }

    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<SessionSchedule>> {
        let mut due: Vec<SessionSchedule> = self
            .schedules
            .iter()
            .filter(|entry| matches!(entry.next_session_date, Some(date) if date <= now))
            .map(|entry| entry.clone())
            .collect();
        due.sort_by_key(|s| s.next_session_date);
        Ok(due)
    }

    async fn save_if_unchanged(&self, schedule: &SessionSchedule) -> Result<bool> {
        let Some(mut stored) = self.schedules.get_mut(&schedule.user_id) else {
            return Ok(false);
        };
        if stored.plan_id != schedule.plan_id || stored.revision != schedule.revision {
            return Ok(false);
        }
        let mut updated = schedule.clone();
        updated.revision += 1;
        *stored = updated;
        Ok(true)
    }

    async fn delete_for_user(&self, user_id: &str) -> Result<bool> {
        Ok(self.schedules.remove(user_id).is_some())
    }
}

/// Notification ledger in insertion order
#[derive(Default)]
pub struct MemoryNotificationLedger {
    records: RwLock<Vec<NotificationRecord>>,
}

impl MemoryNotificationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record, oldest first
    pub async fn all(&self) -> Vec<NotificationRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait::async_trait]
impl NotificationLedger for MemoryNotificationLedger {
    async fn insert(&self, record: NotificationRecord) -> Result<NotificationRecord> {
        self.records.write().await.push(record.clone());
        Ok(record)
    }

    async fn undelivered_for(&self, user_id: &str) -> Result<Vec<NotificationRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.user_id == user_id && !r.delivered)
            .cloned()
            .collect())
    }

    async fn claim_delivered(&self, id: Uuid) -> Result<bool> {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|r| r.id == id) {
            Some(record) if !record.delivered => {
                record.delivered = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<NotificationRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_read(&self, user_id: &str, id: Uuid) -> Result<Option<NotificationRecord>> {
        let mut records = self.records.write().await;
        Ok(records
            .iter_mut()
            .find(|r| r.id == id && r.user_id == user_id)
            .map(|record| {
                record.is_read = true;
                record.clone()
            }))
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<u64> {
        let mut records = self.records.write().await;
        let mut modified = 0;
        for record in records
            .iter_mut()
            .filter(|r| r.user_id == user_id && !r.is_read)
        {
            record.is_read = true;
            modified += 1;
        }
        Ok(modified)
    }

    async fn delete(&self, user_id: &str, id: Uuid) -> Result<bool> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| !(r.id == id && r.user_id == user_id));
        Ok(records.len() < before)
    }

    async fn clear(&self, user_id: &str) -> Result<u64> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.user_id != user_id);
        Ok((before - records.len()) as u64)
    }
}

/// Progress records keyed by user id
#[derive(Default)]
pub struct MemoryProgressStore {
    progress: RwLock<HashMap<String, UserProgress>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn get(&self, user_id: &str) -> Result<Option<UserProgress>> {
        Ok(self.progress.read().await.get(user_id).cloned())
    }

    async fn set_current_session(&self, user_id: &str, current_session: u32) -> Result<()> {
        let mut progress = self.progress.write().await;
        progress
            .entry(user_id.to_string())
            .or_insert_with(|| UserProgress::new(user_id))
            .current_session = current_session;
        Ok(())
    }

    async fn raise_current_session(&self, user_id: &str, current_session: u32) -> Result<()> {
        let mut progress = self.progress.write().await;
        let entry = progress
            .entry(user_id.to_string())
            .or_insert_with(|| UserProgress::new(user_id));
        entry.current_session = entry.current_session.max(current_session);
        Ok(())
    }

    async fn award_badge(&self, user_id: &str, badge: Badge) -> Result<bool> {
        let mut progress = self.progress.write().await;
        let entry = progress
            .entry(user_id.to_string())
            .or_insert_with(|| UserProgress::new(user_id));
        if entry.has_badge(&badge.name) {
            return Ok(false);
        }
        entry.badges.push(badge);
        Ok(true)
    }
}
