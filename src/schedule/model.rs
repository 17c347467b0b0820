//! Session schedule model
//!
//! The occurrence list is the source of truth; `next_session_date` and the
//! per-occurrence `is_active` flag form a cursor that is recomputed from it on
//! every completion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schedule::plan::Frequency;

/// One planned session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    /// 1-based position in the plan
    pub sequence: u32,
    pub scheduled_at: DateTime<Utc>,
    /// True only for the earliest incomplete occurrence
    pub is_active: bool,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Who a schedule belongs to, captured when the plan is installed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleOwner {
    pub user_id: String,
    pub user_name: String,
    pub email: String,
}

/// Position of a schedule in the completion state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "sequence", rename_all = "snake_case")]
pub enum ScheduleState {
    /// Occurrence `k` (1-based) is the first incomplete one
    Pending(u32),
    /// Every occurrence is complete
    Exhausted,
}

/// Result of completing one occurrence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedStep {
    pub sequence: u32,
    pub completed: u32,
    pub total: u32,
    pub next_session_date: Option<DateTime<Utc>>,
}

/// A user's live session schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSchedule {
    /// Identity of this installation; a re-assessment gets a new one
    pub plan_id: Uuid,
    pub user_id: String,
    pub user_name: String,
    pub email: String,
    pub frequency: Frequency,
    pub occurrences: Vec<Occurrence>,
    pub next_session_date: Option<DateTime<Utc>>,
    pub last_session_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency counter, bumped by the store on every write
    pub revision: u64,
}

impl SessionSchedule {
    /// Build a fresh schedule around a generated plan
    pub fn new(
        owner: ScheduleOwner,
        frequency: Frequency,
        occurrences: Vec<Occurrence>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut schedule = Self {
            plan_id: Uuid::new_v4(),
            user_id: owner.user_id,
            user_name: owner.user_name,
            email: owner.email,
            frequency,
            occurrences,
            next_session_date: None,
            last_session_date: None,
            created_at,
            revision: 0,
        };
        schedule.refresh_cursor();
        schedule
    }

    /// Index of the first incomplete occurrence
    pub fn first_pending(&self) -> Option<usize> {
        self.occurrences.iter().position(|o| !o.is_completed)
    }

    pub fn state(&self) -> ScheduleState {
        match self.first_pending() {
            Some(index) => ScheduleState::Pending(self.occurrences[index].sequence),
            None => ScheduleState::Exhausted,
        }
    }

    pub fn completed_count(&self) -> u32 {
        self.occurrences.iter().filter(|o| o.is_completed).count() as u32
    }

    pub fn total(&self) -> u32 {
        self.occurrences.len() as u32
    }

    /// Recompute `is_active` and `next_session_date` from the occurrence list
    pub fn refresh_cursor(&mut self) {
        let pending = self.first_pending();
        for (index, occurrence) in self.occurrences.iter_mut().enumerate() {
            occurrence.is_active = Some(index) == pending;
        }
        self.next_session_date = pending.map(|index| self.occurrences[index].scheduled_at);
    }

    /// Complete the first incomplete occurrence.
    ///
    /// Returns `None` when the schedule is already exhausted.
    pub fn complete_next(&mut self, now: DateTime<Utc>) -> Option<CompletedStep> {
        let index = self.first_pending()?;

        let occurrence = &mut self.occurrences[index];
        occurrence.is_completed = true;
        occurrence.completed_at = Some(now);
        occurrence.is_active = false;
        let sequence = occurrence.sequence;

        self.last_session_date = Some(now);
        self.refresh_cursor();

        Some(CompletedStep {
            sequence,
            completed: self.completed_count(),
            total: self.total(),
            next_session_date: self.next_session_date,
        })
    }

    /// Move the reminder date forward by one increment from its previous
    /// value (not from `now`). Returns the new date, or `None` if there is
    /// nothing to roll.
    pub fn roll_reminder_forward(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let current = self.next_session_date?;
        let next = self.frequency.advance(current, 1)?;
        self.next_session_date = Some(next);
        self.last_session_date = Some(now);
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::plan::generate;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
    }

    fn schedule(count: u32) -> SessionSchedule {
        let owner = ScheduleOwner {
            user_id: "u1".into(),
            user_name: "Ada".into(),
            email: "ada@example.com".into(),
        };
        let plan = generate(Frequency::Weekly, count, start()).unwrap();
        SessionSchedule::new(owner, Frequency::Weekly, plan, start())
    }

    #[test]
    fn test_new_schedule_points_at_first_occurrence() {
        let s = schedule(3);
        assert_eq!(s.state(), ScheduleState::Pending(1));
        assert_eq!(s.next_session_date, Some(start()));
        assert!(s.last_session_date.is_none());
    }

    #[test]
    fn test_completion_moves_cursor() {
        let mut s = schedule(3);
        let now = start() + Duration::hours(1);

        let step = s.complete_next(now).unwrap();
        assert_eq!(step.sequence, 1);
        assert_eq!(step.completed, 1);
        assert_eq!(step.total, 3);
        assert_eq!(step.next_session_date, Some(start() + Duration::days(7)));

        assert_eq!(s.state(), ScheduleState::Pending(2));
        assert!(!s.occurrences[0].is_active);
        assert!(s.occurrences[1].is_active);
        assert!(!s.occurrences[2].is_active);
        assert_eq!(s.occurrences[0].completed_at, Some(now));
        assert_eq!(s.last_session_date, Some(now));
    }

    #[test]
    fn test_last_completion_exhausts() {
        let mut s = schedule(3);
        s.complete_next(start()).unwrap();
        s.complete_next(start()).unwrap();

        let step = s.complete_next(start()).unwrap();
        assert_eq!(step.sequence, 3);
        assert_eq!(step.next_session_date, None);
        assert_eq!(s.state(), ScheduleState::Exhausted);
        assert!(s.next_session_date.is_none());
        assert!(s.occurrences.iter().all(|o| !o.is_active));

        // Exhausted schedules stay put
        let before = s.clone();
        assert!(s.complete_next(start()).is_none());
        assert_eq!(s, before);
    }

    #[test]
    fn test_roll_forward_from_previous_date() {
        let mut s = schedule(3);
        let late = start() + Duration::days(3);
        let next = s.roll_reminder_forward(late).unwrap();
        assert_eq!(next, start() + Duration::days(7));
        assert_eq!(s.last_session_date, Some(late));
    }

    #[test]
    fn test_completion_recomputes_after_roll_forward() {
        let mut s = schedule(3);
        s.roll_reminder_forward(start()).unwrap();
        s.roll_reminder_forward(start()).unwrap();
        assert_eq!(s.next_session_date, Some(start() + Duration::days(14)));

        // Completing re-derives the cursor from the occurrence list
        s.complete_next(start()).unwrap();
        assert_eq!(s.next_session_date, Some(start() + Duration::days(7)));
    }
}
