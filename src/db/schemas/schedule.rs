//! Session schedule document schema

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::schedule::{Occurrence, SessionSchedule};
use crate::types::CadenceError;

/// Collection name for session schedules
pub const SCHEDULE_COLLECTION: &str = "session_schedules";

/// Embedded occurrence
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OccurrenceDoc {
    pub sequence: i32,
    pub session_date: DateTime,
    pub is_active: bool,
    pub is_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime>,
}

/// Session schedule stored in MongoDB, one per user
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ScheduleDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Installation identity, part of the compare-and-swap filter
    pub plan_id: String,

    pub user_id: String,

    /// Display name captured when the plan was installed
    pub user_name: String,

    pub email: String,

    /// weekly | monthly | minute
    pub frequency: String,

    /// Occurrences in chronological order
    pub sessions: Vec<OccurrenceDoc>,

    #[serde(default)]
    pub next_session_date: Option<DateTime>,

    #[serde(default)]
    pub last_session_date: Option<DateTime>,

    /// Compare-and-swap counter
    #[serde(default)]
    pub revision: i64,
}

impl From<&SessionSchedule> for ScheduleDoc {
    fn from(schedule: &SessionSchedule) -> Self {
        Self {
            _id: None,
            metadata: Metadata::created(DateTime::from_chrono(schedule.created_at)),
            plan_id: schedule.plan_id.to_string(),
            user_id: schedule.user_id.clone(),
            user_name: schedule.user_name.clone(),
            email: schedule.email.clone(),
            frequency: schedule.frequency.to_string(),
            sessions: schedule
                .occurrences
                .iter()
                .map(|o| OccurrenceDoc {
                    sequence: o.sequence as i32,
                    session_date: DateTime::from_chrono(o.scheduled_at),
                    is_active: o.is_active,
                    is_completed: o.is_completed,
                    completed_at: o.completed_at.map(DateTime::from_chrono),
                })
                .collect(),
            next_session_date: schedule.next_session_date.map(DateTime::from_chrono),
            last_session_date: schedule.last_session_date.map(DateTime::from_chrono),
            revision: schedule.revision as i64,
        }
    }
}

impl TryFrom<ScheduleDoc> for SessionSchedule {
    type Error = CadenceError;

    fn try_from(doc: ScheduleDoc) -> Result<Self, Self::Error> {
        let frequency = doc.frequency.parse().map_err(|_| {
            CadenceError::Database(format!(
                "schedule for user {} has unknown frequency '{}'",
                doc.user_id, doc.frequency
            ))
        })?;
        let plan_id = Uuid::parse_str(&doc.plan_id).map_err(|e| {
            CadenceError::Database(format!(
                "schedule for user {} has a malformed plan id: {}",
                doc.user_id, e
            ))
        })?;

        Ok(SessionSchedule {
            plan_id,
            user_id: doc.user_id,
            user_name: doc.user_name,
            email: doc.email,
            frequency,
            occurrences: doc
                .sessions
                .into_iter()
                .map(|o| Occurrence {
                    sequence: o.sequence.max(0) as u32,
                    scheduled_at: o.session_date.to_chrono(),
                    is_active: o.is_active,
                    is_completed: o.is_completed,
                    completed_at: o.completed_at.map(|d| d.to_chrono()),
                })
                .collect(),
            next_session_date: doc.next_session_date.map(|d| d.to_chrono()),
            last_session_date: doc.last_session_date.map(|d| d.to_chrono()),
            created_at: doc
                .metadata
                .created_at
                .map(|d| d.to_chrono())
                .unwrap_or_default(),
            revision: doc.revision.max(0) as u64,
        })
    }
}

impl IntoIndexes for ScheduleDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // At most one live schedule per user
            (
                doc! { "user_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("user_id_unique".to_string())
                        .build(),
                ),
            ),
            // Sweep query
            (
                doc! { "next_session_date": 1 },
                Some(
                    IndexOptions::builder()
                        .name("next_session_date_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ScheduleDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{generate, Frequency, ScheduleOwner};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_document_conversion_preserves_schedule() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let owner = ScheduleOwner {
            user_id: "665f1c2e9b1d".into(),
            user_name: "Sam".into(),
            email: "sam@example.com".into(),
        };
        let mut schedule = SessionSchedule::new(
            owner,
            Frequency::Monthly,
            generate(Frequency::Monthly, 3, start).unwrap(),
            start,
        );
        schedule.complete_next(start);
        schedule.revision = 4;

        let doc = ScheduleDoc::from(&schedule);
        assert_eq!(doc.frequency, "monthly");
        assert_eq!(doc.sessions.len(), 3);
        assert_eq!(doc.revision, 4);

        let back = SessionSchedule::try_from(doc).unwrap();
        assert_eq!(back, schedule);
    }

    #[test]
    fn test_unknown_frequency_is_a_database_error() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let owner = ScheduleOwner {
            user_id: "u".into(),
            user_name: "U".into(),
            email: "u@example.com".into(),
        };
        let schedule = SessionSchedule::new(
            owner,
            Frequency::Weekly,
            generate(Frequency::Weekly, 1, start).unwrap(),
            start,
        );
        let mut doc = ScheduleDoc::from(&schedule);
        doc.frequency = "daily".into();

        assert!(matches!(
            SessionSchedule::try_from(doc),
            Err(CadenceError::Database(_))
        ));
    }
}
