//! Plan generation
//!
//! Pure: the same frequency, count and start always yield the same plan.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::schedule::model::Occurrence;
use crate::types::{CadenceError, Result};

/// Recurrence kind of a schedule
///
/// `Minute` exists for accelerated testing but goes through exactly the same
/// arithmetic as the calendar cadences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Weekly,
    Monthly,
    Minute,
}

impl Frequency {
    /// Advance `from` by `steps` increments of this cadence.
    ///
    /// Monthly steps use calendar-month addition, clamping to the last day of
    /// the target month (Jan 31 + 1 month = Feb 29 in a leap year). Returns
    /// `None` if the result is out of range.
    pub fn advance(self, from: DateTime<Utc>, steps: u32) -> Option<DateTime<Utc>> {
        match self {
            Frequency::Weekly => from.checked_add_signed(Duration::days(7 * i64::from(steps))),
            Frequency::Monthly => from.checked_add_months(Months::new(steps)),
            Frequency::Minute => from.checked_add_signed(Duration::minutes(i64::from(steps))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Minute => "minute",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "minute" => Ok(Frequency::Minute),
            other => Err(CadenceError::InvalidInput(format!(
                "unknown frequency '{}' (expected weekly, monthly or minute)",
                other
            ))),
        }
    }
}

/// Generate `total_count` occurrences starting at `start`.
///
/// Occurrence `i` (0-based) lands at `start` advanced by `i` increments and
/// carries sequence number `i + 1`. Only the first is active.
pub fn generate(
    frequency: Frequency,
    total_count: u32,
    start: DateTime<Utc>,
) -> Result<Vec<Occurrence>> {
    if total_count == 0 {
        return Err(CadenceError::InvalidInput(
            "a plan needs at least one session".into(),
        ));
    }

    (0..total_count)
        .map(|i| {
            let scheduled_at = frequency.advance(start, i).ok_or_else(|| {
                CadenceError::InvalidInput(format!(
                    "session {} of a {} plan falls outside the supported date range",
                    i + 1,
                    frequency
                ))
            })?;
            Ok(Occurrence {
                sequence: i + 1,
                scheduled_at,
                is_active: i == 0,
                is_completed: false,
                completed_at: None,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_weekly_plan_dates() {
        let plan = generate(Frequency::Weekly, 3, at(2024, 1, 1)).unwrap();
        let dates: Vec<_> = plan.iter().map(|o| o.scheduled_at).collect();
        assert_eq!(dates, vec![at(2024, 1, 1), at(2024, 1, 8), at(2024, 1, 15)]);
    }

    #[test]
    fn test_monthly_plan_clamps_to_month_end() {
        let plan = generate(Frequency::Monthly, 4, at(2024, 1, 31)).unwrap();
        let dates: Vec<_> = plan.iter().map(|o| o.scheduled_at).collect();
        // Each step is computed from the start, so March goes back to the 31st
        assert_eq!(
            dates,
            vec![at(2024, 1, 31), at(2024, 2, 29), at(2024, 3, 31), at(2024, 4, 30)]
        );
    }

    #[test]
    fn test_monthly_non_leap_february() {
        let plan = generate(Frequency::Monthly, 2, at(2023, 1, 31)).unwrap();
        assert_eq!(plan[1].scheduled_at, at(2023, 2, 28));
    }

    #[test]
    fn test_minute_plan() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 0).unwrap();
        let plan = generate(Frequency::Minute, 3, start).unwrap();
        assert_eq!(plan[1].scheduled_at, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
        assert_eq!(plan[2].scheduled_at, Utc.with_ymd_and_hms(2024, 1, 2, 0, 1, 0).unwrap());
    }

    #[test]
    fn test_plan_shape_for_every_cadence() {
        for frequency in [Frequency::Weekly, Frequency::Monthly, Frequency::Minute] {
            for count in [1u32, 2, 7, 24] {
                let plan = generate(frequency, count, at(2024, 1, 31)).unwrap();
                assert_eq!(plan.len(), count as usize);
                for (i, occurrence) in plan.iter().enumerate() {
                    assert_eq!(occurrence.sequence, i as u32 + 1);
                    assert_eq!(occurrence.is_active, i == 0);
                    assert!(!occurrence.is_completed);
                    assert!(occurrence.completed_at.is_none());
                }
                assert!(plan.windows(2).all(|w| w[0].scheduled_at < w[1].scheduled_at));
            }
        }
    }

    #[test]
    fn test_zero_count_rejected() {
        let err = generate(Frequency::Weekly, 0, at(2024, 1, 1)).unwrap_err();
        assert!(matches!(err, CadenceError::InvalidInput(_)));
    }

    #[test]
    fn test_frequency_parsing() {
        assert_eq!("Weekly".parse::<Frequency>().unwrap(), Frequency::Weekly);
        assert_eq!(" monthly ".parse::<Frequency>().unwrap(), Frequency::Monthly);
        assert_eq!("minute".parse::<Frequency>().unwrap(), Frequency::Minute);
        assert!(matches!(
            "fortnightly".parse::<Frequency>(),
            Err(CadenceError::InvalidInput(_))
        ));
    }
}
