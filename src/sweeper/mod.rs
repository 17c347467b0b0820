//! Reminder sweeper
//!
//! Background task that finds schedules whose reminder date has passed,
//! emails the user, pushes a live notification and rolls the reminder date
//! forward one increment. Mail failure leaves the date where it is so the
//! next tick retries.

pub mod reminder;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::delivery::DeliveryCoordinator;
use crate::mail::Mailer;
use crate::schedule::{modify_schedule, Mutation, SessionSchedule};
use crate::store::ScheduleStore;
use crate::types::{CadenceError, Result};

pub use reminder::{Reminder, REMINDER_TITLE};

/// When the sweeper fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepCadence {
    /// Once a day at `hour:00` UTC
    DailyAt { hour: u32 },
    /// Fixed interval, for testing
    Every(Duration),
}

impl SweepCadence {
    /// The first fire time strictly after `now`
    pub fn next_fire(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            SweepCadence::DailyAt { hour } => {
                let today = now
                    .date_naive()
                    .and_hms_opt(hour.min(23), 0, 0)
                    .map(|t| t.and_utc());
                match today {
                    Some(fire) if fire > now => fire,
                    Some(fire) => fire + ChronoDuration::days(1),
                    None => now + ChronoDuration::days(1),
                }
            }
            SweepCadence::Every(interval) => {
                now + ChronoDuration::from_std(interval).unwrap_or(ChronoDuration::minutes(1))
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            SweepCadence::DailyAt { hour } => format!("daily at {:02}:00 UTC", hour),
            SweepCadence::Every(interval) => format!("every {:?}", interval),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub cadence: SweepCadence,
    /// Upper bound on one email send
    pub mail_timeout: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            cadence: SweepCadence::DailyAt { hour: 9 },
            mail_timeout: Duration::from_secs(15),
        }
    }
}

/// Counts from one sweep tick
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub due: usize,
    pub reminded: usize,
    pub mail_failed: usize,
    /// Changed by a completion between the scan and the advance
    pub stale: usize,
    pub errors: usize,
}

enum Outcome {
    Reminded(DateTime<Utc>),
    MailFailed,
    Stale,
}

pub struct ReminderSweeper {
    schedules: Arc<dyn ScheduleStore>,
    mailer: Arc<dyn Mailer>,
    delivery: Arc<DeliveryCoordinator>,
    clock: Arc<dyn Clock>,
    config: SweepConfig,
}

impl ReminderSweeper {
    pub fn new(
        schedules: Arc<dyn ScheduleStore>,
        mailer: Arc<dyn Mailer>,
        delivery: Arc<DeliveryCoordinator>,
        clock: Arc<dyn Clock>,
        config: SweepConfig,
    ) -> Self {
        Self {
            schedules,
            mailer,
            delivery,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Run one sweep over every due schedule.
    ///
    /// Only the due query can fail the tick. Each schedule is handled on its
    /// own; its failures are logged and counted.
    pub async fn tick(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let due = self.schedules.find_due(now).await?;

        let mut report = SweepReport {
            due: due.len(),
            ..Default::default()
        };
        if due.is_empty() {
            debug!(now = %now, "No reminders due");
            return Ok(report);
        }

        for schedule in due {
            match self.remind(&schedule, now).await {
                Ok(Outcome::Reminded(next)) => {
                    report.reminded += 1;
                    info!(
                        user_id = %schedule.user_id,
                        frequency = %schedule.frequency,
                        next_reminder = %next,
                        "Reminder sent"
                    );
                }
                Ok(Outcome::MailFailed) => report.mail_failed += 1,
                Ok(Outcome::Stale) => {
                    report.stale += 1;
                    debug!(user_id = %schedule.user_id, "Schedule changed during sweep, not advanced");
                }
                Err(e) => {
                    report.errors += 1;
                    error!(user_id = %schedule.user_id, error = %e, "Failed to process reminder");
                }
            }
        }

        info!(
            due = report.due,
            reminded = report.reminded,
            mail_failed = report.mail_failed,
            stale = report.stale,
            errors = report.errors,
            "Reminder sweep finished"
        );
        Ok(report)
    }

    async fn remind(&self, schedule: &SessionSchedule, now: DateTime<Utc>) -> Result<Outcome> {
        let Some(observed) = schedule.next_session_date else {
            return Ok(Outcome::Stale);
        };
        let reminder = Reminder::render(schedule, observed);

        let sent = tokio::time::timeout(
            self.config.mail_timeout,
            self.mailer
                .send(&schedule.email, &reminder.subject, &reminder.html),
        )
        .await;
        match sent {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(user_id = %schedule.user_id, email = %schedule.email, error = %e, "Reminder email failed, will retry next sweep");
                return Ok(Outcome::MailFailed);
            }
            Err(_) => {
                warn!(
                    user_id = %schedule.user_id,
                    email = %schedule.email,
                    timeout_ms = self.config.mail_timeout.as_millis() as u64,
                    "Reminder email timed out, will retry next sweep"
                );
                return Ok(Outcome::MailFailed);
            }
        }

        self.delivery
            .deliver_best_effort(&schedule.user_id, REMINDER_TITLE, &reminder.notification)
            .await;

        let advanced = modify_schedule(self.schedules.as_ref(), &schedule.user_id, |current| {
            if current.next_session_date != Some(observed) {
                return Mutation::Skip(None);
            }
            match current.roll_reminder_forward(now) {
                Some(next) => Mutation::Write(Some(next)),
                None => Mutation::Skip(None),
            }
        })
        .await;

        match advanced {
            Ok((_, Some(next))) => Ok(Outcome::Reminded(next)),
            Ok((_, None)) | Err(CadenceError::NotFound(_)) => Ok(Outcome::Stale),
            Err(e) => Err(e),
        }
    }

    /// Start the sweep loop on the runtime
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        info!(cadence = %self.config.cadence.describe(), "Starting reminder sweeper");

        tokio::spawn(async move {
            loop {
                let now = self.clock.now();
                let fire_at = self.config.cadence.next_fire(now);
                let wait = (fire_at - now).to_std().unwrap_or(Duration::ZERO);
                debug!(fire_at = %fire_at, "Next reminder sweep scheduled");
                tokio::time::sleep(wait).await;

                if let Err(e) = self.tick().await {
                    error!(error = %e, "Reminder sweep failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::presence::LocalPresence;
    use crate::schedule::{generate, Frequency, ScheduleOwner};
    use crate::store::{MemoryNotificationLedger, MemoryScheduleStore, NotificationLedger};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    /// Mailer whose outcome is flipped by the test
    #[derive(Default)]
    struct ScriptedMailer {
        failing: AtomicBool,
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl Mailer for ScriptedMailer {
        async fn send(&self, to: &str, subject: &str, _html: &str) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) || to.starts_with("broken") {
                return Err(CadenceError::Mail("relay down".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string()));
            Ok(())
        }

        fn describe(&self) -> String {
            "scripted".into()
        }
    }

    struct HangingMailer;

    #[async_trait::async_trait]
    impl Mailer for HangingMailer {
        async fn send(&self, _to: &str, _subject: &str, _html: &str) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        fn describe(&self) -> String {
            "hanging".into()
        }
    }

    /// Completes the user's next session while the email is in flight
    struct RacingMailer {
        schedules: Arc<MemoryScheduleStore>,
    }

    #[async_trait::async_trait]
    impl Mailer for RacingMailer {
        async fn send(&self, _to: &str, _subject: &str, _html: &str) -> Result<()> {
            let mut schedule = self.schedules.find_by_user("u1").await?.unwrap();
            schedule.complete_next(at(2024, 1, 3, 9));
            assert!(self.schedules.save_if_unchanged(&schedule).await?);
            Ok(())
        }

        fn describe(&self) -> String {
            "racing".into()
        }
    }

    struct Fixture {
        schedules: Arc<MemoryScheduleStore>,
        ledger: Arc<MemoryNotificationLedger>,
        clock: Arc<ManualClock>,
        delivery: Arc<DeliveryCoordinator>,
    }

    impl Fixture {
        fn new(now: DateTime<Utc>) -> Self {
            let clock = Arc::new(ManualClock::new(now));
            let ledger = Arc::new(MemoryNotificationLedger::new());
            let delivery = Arc::new(DeliveryCoordinator::new(
                ledger.clone(),
                LocalPresence::shared(),
                clock.clone(),
            ));
            Self {
                schedules: Arc::new(MemoryScheduleStore::new()),
                ledger,
                clock,
                delivery,
            }
        }

        async fn install(&self, user_id: &str, email: &str, frequency: Frequency, start: DateTime<Utc>) {
            let owner = ScheduleOwner {
                user_id: user_id.into(),
                user_name: "Ada".into(),
                email: email.into(),
            };
            let plan = generate(frequency, 4, start).unwrap();
            self.schedules
                .replace_for_user(SessionSchedule::new(owner, frequency, plan, start))
                .await
                .unwrap();
        }

        fn sweeper(&self, mailer: Arc<dyn Mailer>, mail_timeout: Duration) -> ReminderSweeper {
            ReminderSweeper::new(
                self.schedules.clone(),
                mailer,
                self.delivery.clone(),
                self.clock.clone(),
                SweepConfig {
                    cadence: SweepCadence::Every(Duration::from_secs(60)),
                    mail_timeout,
                },
            )
        }

        async fn next_date(&self, user_id: &str) -> Option<DateTime<Utc>> {
            self.schedules
                .find_by_user(user_id)
                .await
                .unwrap()
                .unwrap()
                .next_session_date
        }
    }

    #[test]
    fn test_daily_next_fire() {
        let cadence = SweepCadence::DailyAt { hour: 9 };
        assert_eq!(cadence.next_fire(at(2024, 1, 1, 8)), at(2024, 1, 1, 9));
        assert_eq!(cadence.next_fire(at(2024, 1, 1, 9)), at(2024, 1, 2, 9));
        assert_eq!(cadence.next_fire(at(2024, 1, 31, 22)), at(2024, 2, 1, 9));
    }

    #[test]
    fn test_interval_next_fire() {
        let cadence = SweepCadence::Every(Duration::from_secs(60));
        let now = at(2024, 1, 1, 8);
        assert_eq!(cadence.next_fire(now), now + ChronoDuration::minutes(1));
    }

    #[tokio::test]
    async fn test_mail_failure_holds_date_then_retry_advances_from_original() {
        let f = Fixture::new(at(2024, 1, 3, 9));
        f.install("u1", "ada@example.com", Frequency::Weekly, at(2024, 1, 1, 9)).await;

        let mailer = Arc::new(ScriptedMailer::default());
        mailer.failing.store(true, Ordering::SeqCst);
        let sweeper = f.sweeper(mailer.clone(), Duration::from_secs(5));

        let report = sweeper.tick().await.unwrap();
        assert_eq!(report.due, 1);
        assert_eq!(report.mail_failed, 1);
        assert_eq!(f.next_date("u1").await, Some(at(2024, 1, 1, 9)));
        assert!(f.ledger.all().await.is_empty());

        mailer.failing.store(false, Ordering::SeqCst);
        f.clock.advance(ChronoDuration::days(1));
        let report = sweeper.tick().await.unwrap();
        assert_eq!(report.reminded, 1);

        // One increment from the missed date, not from now
        assert_eq!(f.next_date("u1").await, Some(at(2024, 1, 8, 9)));
        let stored = f.schedules.find_by_user("u1").await.unwrap().unwrap();
        assert_eq!(stored.last_session_date, Some(at(2024, 1, 4, 9)));

        let sent = mailer.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![("ada@example.com".to_string(), "Time for Your Weekly Self-Care".to_string())]
        );
        let inbox = f.ledger.list_for_user("u1").await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].title, REMINDER_TITLE);
    }

    #[tokio::test]
    async fn test_not_due_is_ignored() {
        let f = Fixture::new(at(2024, 1, 1, 8));
        f.install("u1", "ada@example.com", Frequency::Weekly, at(2024, 1, 1, 9)).await;

        let sweeper = f.sweeper(Arc::new(ScriptedMailer::default()), Duration::from_secs(5));
        assert_eq!(sweeper.tick().await.unwrap(), SweepReport::default());
        assert_eq!(f.next_date("u1").await, Some(at(2024, 1, 1, 9)));
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_the_sweep() {
        let f = Fixture::new(at(2024, 2, 1, 9));
        f.install("u1", "broken@example.com", Frequency::Weekly, at(2024, 1, 1, 9)).await;
        f.install("u2", "bo@example.com", Frequency::Monthly, at(2024, 1, 31, 9)).await;

        let mailer = Arc::new(ScriptedMailer::default());
        let report = f
            .sweeper(mailer.clone(), Duration::from_secs(5))
            .tick()
            .await
            .unwrap();

        assert_eq!(report.due, 2);
        assert_eq!(report.reminded, 1);
        assert_eq!(report.mail_failed, 1);
        assert_eq!(f.next_date("u1").await, Some(at(2024, 1, 1, 9)));
        assert_eq!(f.next_date("u2").await, Some(at(2024, 2, 29, 9)));
        assert_eq!(
            mailer.sent.lock().unwrap()[0].1,
            "It's Time for Your Monthly Reflection"
        );
    }

    #[tokio::test]
    async fn test_mail_timeout_counts_as_failure() {
        let f = Fixture::new(at(2024, 1, 3, 9));
        f.install("u1", "ada@example.com", Frequency::Weekly, at(2024, 1, 1, 9)).await;

        let report = f
            .sweeper(Arc::new(HangingMailer), Duration::from_millis(50))
            .tick()
            .await
            .unwrap();
        assert_eq!(report.mail_failed, 1);
        assert_eq!(f.next_date("u1").await, Some(at(2024, 1, 1, 9)));
    }

    #[tokio::test]
    async fn test_completion_during_sweep_is_not_double_advanced() {
        let f = Fixture::new(at(2024, 1, 3, 9));
        f.install("u1", "ada@example.com", Frequency::Weekly, at(2024, 1, 1, 9)).await;

        let mailer = Arc::new(RacingMailer {
            schedules: f.schedules.clone(),
        });
        let report = f
            .sweeper(mailer, Duration::from_secs(5))
            .tick()
            .await
            .unwrap();

        assert_eq!(report.stale, 1);
        assert_eq!(report.reminded, 0);
        // Completion moved the cursor to occurrence 2; the sweep left it alone
        assert_eq!(f.next_date("u1").await, Some(at(2024, 1, 8, 9)));
        let stored = f.schedules.find_by_user("u1").await.unwrap().unwrap();
        assert_eq!(stored.completed_count(), 1);
    }
}
