//! Completion state machine
//!
//! Marks the user's first incomplete occurrence done, updates their progress
//! counter and milestone badges, then tells them about it. The schedule write
//! is the operation's outcome; the notification is best-effort.

use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::clock::Clock;
use crate::delivery::DeliveryCoordinator;
use crate::schedule::{format_session_date, modify_schedule, CompletedStep, Mutation, SessionSchedule};
use crate::store::{Badge, ProgressStore, ScheduleStore, BADGE_COMPLETION, BADGE_HALFWAY};
use crate::types::Result;

/// What a completion request did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// An occurrence was completed and more remain
    Advanced,
    /// The last occurrence was completed
    Exhausted,
    /// The schedule was already exhausted
    NothingPending,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResult {
    pub schedule: SessionSchedule,
    /// Completed count + 1
    pub current_session: u32,
    #[serde(rename = "status")]
    pub transition: Transition,
}

/// Milestone badges earned at `completed` of `total`
pub fn milestones(completed: u32, total: u32) -> Vec<(&'static str, &'static str)> {
    let mut earned = Vec::new();
    let half = total / 2;
    if half >= 1 && completed == half {
        earned.push((BADGE_HALFWAY, "Completed half of your therapy plan!"));
    }
    if total >= 1 && completed == total {
        earned.push((
            BADGE_COMPLETION,
            "Successfully completed your entire therapy journey!",
        ));
    }
    earned
}

pub struct CompletionService {
    schedules: Arc<dyn ScheduleStore>,
    progress: Arc<dyn ProgressStore>,
    delivery: Arc<DeliveryCoordinator>,
    clock: Arc<dyn Clock>,
}

impl CompletionService {
    pub fn new(
        schedules: Arc<dyn ScheduleStore>,
        progress: Arc<dyn ProgressStore>,
        delivery: Arc<DeliveryCoordinator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            schedules,
            progress,
            delivery,
            clock,
        }
    }

    /// Complete the user's next pending session.
    ///
    /// Fails with `NotFound` when the user has no schedule. An exhausted
    /// schedule is reported as [`Transition::NothingPending`], not an error.
    pub async fn complete_next(&self, user_id: &str) -> Result<CompletionResult> {
        let now = self.clock.now();

        let (schedule, step) =
            modify_schedule(self.schedules.as_ref(), user_id, |schedule| {
                match schedule.complete_next(now) {
                    Some(step) => Mutation::Write(Some(step)),
                    None => Mutation::Skip(None),
                }
            })
            .await?;

        let Some(step) = step else {
            info!(user_id = %user_id, "No pending sessions to complete");
            return Ok(CompletionResult {
                current_session: schedule.completed_count() + 1,
                schedule,
                transition: Transition::NothingPending,
            });
        };

        // Racing completions may land out of order
        let current_session = step.completed + 1;
        self.progress
            .raise_current_session(user_id, current_session)
            .await?;

        for (name, description) in milestones(step.completed, step.total) {
            if self
                .progress
                .award_badge(user_id, Badge::new(name, description, now))
                .await?
            {
                info!(user_id = %user_id, badge = %name, "Badge awarded");
            }
        }

        let transition = if step.next_session_date.is_some() {
            Transition::Advanced
        } else {
            Transition::Exhausted
        };
        self.notify(user_id, &step).await;

        info!(
            user_id = %user_id,
            sequence = step.sequence,
            completed = step.completed,
            total = step.total,
            "Session marked complete"
        );

        Ok(CompletionResult {
            schedule,
            current_session,
            transition,
        })
    }

    async fn notify(&self, user_id: &str, step: &CompletedStep) {
        match step.next_session_date {
            Some(next) => {
                let message = format!(
                    "Well done! You've finished session {} of {}. Your next session is scheduled for {}.",
                    step.completed,
                    step.total,
                    format_session_date(next)
                );
                self.delivery
                    .deliver_best_effort(user_id, "Session Completed!", &message)
                    .await;
            }
            None => {
                let message = format!(
                    "Congratulations! You have successfully completed your entire therapy plan of {} sessions. You're a true Warrior!",
                    step.total
                );
                self.delivery
                    .deliver_best_effort(user_id, "All Sessions Completed!", &message)
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::presence::LocalPresence;
    use crate::schedule::{generate, Frequency, ScheduleOwner, ScheduleState};
    use crate::store::{
        MemoryNotificationLedger, MemoryProgressStore, MemoryScheduleStore, NotificationLedger,
    };
    use crate::types::CadenceError;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tokio_test::{assert_err, assert_ok};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
    }

    struct Fixture {
        service: CompletionService,
        schedules: Arc<MemoryScheduleStore>,
        progress: Arc<MemoryProgressStore>,
        ledger: Arc<MemoryNotificationLedger>,
    }

    async fn fixture(total: u32) -> Fixture {
        let clock = Arc::new(ManualClock::new(start() + Duration::hours(1)));
        let schedules = Arc::new(MemoryScheduleStore::new());
        let progress = Arc::new(MemoryProgressStore::new());
        let ledger = Arc::new(MemoryNotificationLedger::new());
        let delivery = Arc::new(DeliveryCoordinator::new(
            ledger.clone(),
            LocalPresence::shared(),
            clock.clone(),
        ));

        let owner = ScheduleOwner {
            user_id: "u1".into(),
            user_name: "Ada".into(),
            email: "ada@example.com".into(),
        };
        let plan = generate(Frequency::Weekly, total, start()).unwrap();
        schedules
            .replace_for_user(SessionSchedule::new(owner, Frequency::Weekly, plan, start()))
            .await
            .unwrap();

        let service =
            CompletionService::new(schedules.clone(), progress.clone(), delivery, clock);
        Fixture {
            service,
            schedules,
            progress,
            ledger,
        }
    }

    #[test]
    fn test_milestones() {
        assert_eq!(milestones(2, 4), vec![(BADGE_HALFWAY, "Completed half of your therapy plan!")]);
        assert_eq!(milestones(2, 5).len(), 1);
        assert!(milestones(3, 5).is_empty());
        assert_eq!(milestones(4, 4)[0].0, BADGE_COMPLETION);
        // A single-session plan has no halfway point
        assert_eq!(milestones(1, 1).len(), 1);
        assert!(milestones(0, 1).is_empty());
    }

    #[tokio::test]
    async fn test_complete_advances_and_notifies() {
        let f = fixture(4).await;
        let result = assert_ok!(f.service.complete_next("u1").await);

        assert_eq!(result.transition, Transition::Advanced);
        assert_eq!(result.current_session, 2);
        assert_eq!(result.schedule.state(), ScheduleState::Pending(2));
        assert_eq!(
            result.schedule.next_session_date,
            Some(start() + Duration::days(7))
        );

        let progress = f.progress.get("u1").await.unwrap().unwrap();
        assert_eq!(progress.current_session, 2);

        let inbox = f.ledger.list_for_user("u1").await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].title, "Session Completed!");
        assert!(inbox[0].message.contains("session 1 of 4"));
        assert!(inbox[0].message.contains("Jan 8, 2024"));
    }

    #[tokio::test]
    async fn test_last_completion_exhausts_and_is_then_noop() {
        let f = fixture(3).await;
        f.service.complete_next("u1").await.unwrap();
        f.service.complete_next("u1").await.unwrap();

        let last = f.service.complete_next("u1").await.unwrap();
        assert_eq!(last.transition, Transition::Exhausted);
        assert_eq!(last.schedule.state(), ScheduleState::Exhausted);
        assert!(last.schedule.next_session_date.is_none());
        assert_eq!(last.current_session, 4);

        let again = f.service.complete_next("u1").await.unwrap();
        assert_eq!(again.transition, Transition::NothingPending);
        assert_eq!(again.current_session, 4);
        assert_eq!(again.schedule.revision, last.schedule.revision);

        let titles: Vec<_> = f
            .ledger
            .list_for_user("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.title)
            .collect();
        assert_eq!(
            titles,
            vec!["All Sessions Completed!", "Session Completed!", "Session Completed!"]
        );

        let progress = f.progress.get("u1").await.unwrap().unwrap();
        assert!(progress.has_badge(BADGE_COMPLETION));
        assert!(progress.has_badge(BADGE_HALFWAY));
    }

    #[tokio::test]
    async fn test_missing_schedule() {
        let f = fixture(2).await;
        let err = assert_err!(f.service.complete_next("nobody").await);
        assert!(matches!(err, CadenceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_completions_never_double_advance() {
        let f = fixture(4).await;
        let service = Arc::new(f.service);

        let a = {
            let service = service.clone();
            tokio::spawn(async move { service.complete_next("u1").await })
        };
        let b = {
            let service = service.clone();
            tokio::spawn(async move { service.complete_next("u1").await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let schedule = f.schedules.find_by_user("u1").await.unwrap().unwrap();
        assert_eq!(schedule.completed_count(), 2);
        assert_eq!(schedule.state(), ScheduleState::Pending(3));

        let progress = f.progress.get("u1").await.unwrap().unwrap();
        let halfway = progress
            .badges
            .iter()
            .filter(|b| b.name == BADGE_HALFWAY)
            .count();
        assert_eq!(halfway, 1);
    }

    /// Holds back the write of one specific session index
    struct LaggingProgress {
        inner: Arc<MemoryProgressStore>,
        lagging: u32,
    }

    #[async_trait::async_trait]
    impl ProgressStore for LaggingProgress {
        async fn get(&self, user_id: &str) -> Result<Option<crate::store::UserProgress>> {
            self.inner.get(user_id).await
        }

        async fn set_current_session(&self, user_id: &str, current_session: u32) -> Result<()> {
            self.inner.set_current_session(user_id, current_session).await
        }

        async fn raise_current_session(&self, user_id: &str, current_session: u32) -> Result<()> {
            if current_session == self.lagging {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
            self.inner.raise_current_session(user_id, current_session).await
        }

        async fn award_badge(&self, user_id: &str, badge: Badge) -> Result<bool> {
            self.inner.award_badge(user_id, badge).await
        }
    }

    #[tokio::test]
    async fn test_out_of_order_progress_writes_never_lower_current_session() {
        let f = fixture(4).await;
        let clock = Arc::new(ManualClock::new(start() + Duration::hours(1)));
        let delivery = Arc::new(DeliveryCoordinator::new(
            f.ledger.clone(),
            LocalPresence::shared(),
            clock.clone(),
        ));
        let progress = Arc::new(LaggingProgress {
            inner: f.progress.clone(),
            lagging: 2,
        });
        let service = Arc::new(CompletionService::new(
            f.schedules.clone(),
            progress,
            delivery,
            clock,
        ));

        let a = {
            let service = service.clone();
            tokio::spawn(async move { service.complete_next("u1").await })
        };
        let b = {
            let service = service.clone();
            tokio::spawn(async move { service.complete_next("u1").await })
        };
        assert_ok!(a.await.unwrap());
        assert_ok!(b.await.unwrap());

        let schedule = f.schedules.find_by_user("u1").await.unwrap().unwrap();
        assert_eq!(schedule.completed_count(), 2);

        let stored = f.progress.get("u1").await.unwrap().unwrap();
        assert_eq!(stored.current_session, schedule.completed_count() + 1);
    }
}
