//! Schedule installation and guarded mutation

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::delivery::DeliveryCoordinator;
use crate::schedule::{generate, Frequency, ScheduleOwner, SessionSchedule};
use crate::store::{Badge, ProgressStore, ScheduleStore, BADGE_FIRST_ASSESSMENT};
use crate::types::{CadenceError, Result};

/// Attempts at a read-modify-write before giving up with `Conflict`
pub const MAX_WRITE_ATTEMPTS: usize = 8;

/// What a schedule mutation decided
pub enum Mutation<T> {
    /// Persist the mutated schedule
    Write(T),
    /// Leave the stored schedule untouched
    Skip(T),
}

/// Load a user's schedule, apply `mutate`, and write it back if the stored
/// revision has not moved. On conflict the schedule is reloaded and `mutate`
/// runs again against the fresh copy.
pub async fn modify_schedule<T, F>(
    store: &dyn ScheduleStore,
    user_id: &str,
    mut mutate: F,
) -> Result<(SessionSchedule, T)>
where
    F: FnMut(&mut SessionSchedule) -> Mutation<T> + Send,
    T: Send,
{
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let mut schedule = store.find_by_user(user_id).await?.ok_or_else(|| {
            CadenceError::NotFound(format!("no session schedule for user {}", user_id))
        })?;

        match mutate(&mut schedule) {
            Mutation::Skip(value) => return Ok((schedule, value)),
            Mutation::Write(value) => {
                if store.save_if_unchanged(&schedule).await? {
                    schedule.revision += 1;
                    return Ok((schedule, value));
                }
                debug!(user_id = %user_id, attempt, "Schedule write conflict, retrying");
            }
        }
    }

    Err(CadenceError::Conflict(format!(
        "schedule for user {} kept changing after {} attempts",
        user_id, MAX_WRITE_ATTEMPTS
    )))
}

/// Recommendation to turn into a plan
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    #[serde(default)]
    pub user_id: String,
    pub user_name: String,
    pub email: String,
    pub frequency: String,
    pub total_sessions: u32,
    /// Defaults to now
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
}

/// Installs plans and serves schedule lookups
pub struct ScheduleService {
    schedules: Arc<dyn ScheduleStore>,
    progress: Arc<dyn ProgressStore>,
    delivery: Arc<DeliveryCoordinator>,
    clock: Arc<dyn Clock>,
}

impl ScheduleService {
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

    /// Replace the user's schedule with a freshly generated plan
    pub async fn install_plan(&self, request: PlanRequest) -> Result<SessionSchedule> {
        if request.user_id.trim().is_empty() {
            return Err(CadenceError::InvalidInput("user id is required".into()));
        }
        if request.email.trim().is_empty() {
            return Err(CadenceError::InvalidInput("email is required".into()));
        }
        let frequency: Frequency = request.frequency.parse()?;

        let now = self.clock.now();
        let start = request.start_date.unwrap_or(now);
        let occurrences = generate(frequency, request.total_sessions, start)?;

        let owner = ScheduleOwner {
            user_id: request.user_id.clone(),
            user_name: request.user_name.trim().to_string(),
            email: request.email.trim().to_string(),
        };
        let schedule = SessionSchedule::new(owner, frequency, occurrences, now);
        let schedule = self.schedules.replace_for_user(schedule).await?;
        self.progress
            .set_current_session(&schedule.user_id, 1)
            .await?;

        info!(
            user_id = %schedule.user_id,
            frequency = %frequency,
            total = schedule.total(),
            "Installed session plan"
        );

        let badge = Badge::new(
            BADGE_FIRST_ASSESSMENT,
            "Completed your initial mental health assessment!",
            now,
        );
        if self.progress.award_badge(&schedule.user_id, badge).await? {
            self.delivery
                .deliver_best_effort(
                    &schedule.user_id,
                    "New Badge Unlocked!",
                    "You've earned the 'First Assessment' badge for completing your evaluation.",
                )
                .await;
        }

        let first = schedule
            .next_session_date
            .map(format_session_date)
            .unwrap_or_else(|| "soon".to_string());
        self.delivery
            .deliver_best_effort(
                &schedule.user_id,
                "Therapy Plan Ready!",
                &format!(
                    "Your personalized plan with {} sessions is ready. Your first session is scheduled for {}.",
                    schedule.total(),
                    first
                ),
            )
            .await;

        Ok(schedule)
    }

    pub async fn schedule_for(&self, user_id: &str) -> Result<SessionSchedule> {
        self.schedules.find_by_user(user_id).await?.ok_or_else(|| {
            CadenceError::NotFound(format!("no session schedule for user {}", user_id))
        })
    }
}

/// Human-readable session date used in notification text
pub fn format_session_date(date: DateTime<Utc>) -> String {
    date.format("%b %-d, %Y %H:%M UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::presence::LocalPresence;
    use crate::store::{
        MemoryNotificationLedger, MemoryProgressStore, MemoryScheduleStore, NotificationLedger,
    };
    use crate::schedule::ScheduleState;
    use chrono::TimeZone;

    struct Fixture {
        service: ScheduleService,
        schedules: Arc<MemoryScheduleStore>,
        ledger: Arc<MemoryNotificationLedger>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
        ));
        let schedules = Arc::new(MemoryScheduleStore::new());
        let ledger = Arc::new(MemoryNotificationLedger::new());
        let delivery = Arc::new(DeliveryCoordinator::new(
            ledger.clone(),
            LocalPresence::shared(),
            clock.clone(),
        ));
        let service = ScheduleService::new(
            schedules.clone(),
            Arc::new(MemoryProgressStore::new()),
            delivery,
            clock,
        );
        Fixture {
            service,
            schedules,
            ledger,
        }
    }

    fn request(user_id: &str, frequency: &str, total: u32) -> PlanRequest {
        PlanRequest {
            user_id: user_id.into(),
            user_name: "Ada".into(),
            email: "ada@example.com".into(),
            frequency: frequency.into(),
            total_sessions: total,
            start_date: None,
        }
    }

    #[tokio::test]
    async fn test_install_plan() {
        let f = fixture();
        let schedule = f.service.install_plan(request("u1", "weekly", 8)).await.unwrap();

        assert_eq!(schedule.total(), 8);
        assert_eq!(schedule.state(), ScheduleState::Pending(1));
        assert_eq!(
            schedule.next_session_date,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap())
        );

        let titles: Vec<_> = f
            .ledger
            .list_for_user("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.title)
            .collect();
        assert_eq!(titles, vec!["Therapy Plan Ready!", "New Badge Unlocked!"]);
    }

    #[tokio::test]
    async fn test_reinstall_replaces_and_badge_once() {
        let f = fixture();
        f.service.install_plan(request("u1", "weekly", 8)).await.unwrap();
        let replaced = f.service.install_plan(request("u1", "monthly", 3)).await.unwrap();

        assert_eq!(f.schedules.len(), 1);
        assert_eq!(replaced.frequency, Frequency::Monthly);
        assert_eq!(f.service.schedule_for("u1").await.unwrap().total(), 3);

        let badges = f
            .ledger
            .list_for_user("u1")
            .await
            .unwrap()
            .into_iter()
            .filter(|n| n.title == "New Badge Unlocked!")
            .count();
        assert_eq!(badges, 1);
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let f = fixture();
        assert!(matches!(
            f.service.install_plan(request("u1", "daily", 3)).await,
            Err(CadenceError::InvalidInput(_))
        ));
        assert!(matches!(
            f.service.install_plan(request("u1", "weekly", 0)).await,
            Err(CadenceError::InvalidInput(_))
        ));
        assert!(matches!(
            f.service.install_plan(request(" ", "weekly", 3)).await,
            Err(CadenceError::InvalidInput(_))
        ));
        assert!(f.schedules.is_empty());
    }

    #[tokio::test]
    async fn test_missing_schedule_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.service.schedule_for("nobody").await,
            Err(CadenceError::NotFound(_))
        ));
        let result = modify_schedule(f.schedules.as_ref(), "nobody", |_| Mutation::Skip(())).await;
        assert!(matches!(result, Err(CadenceError::NotFound(_))));
    }

    #[test]
    fn test_format_session_date() {
        let date = Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap();
        assert_eq!(format_session_date(date), "Mar 5, 2024 14:30 UTC");
    }
}
