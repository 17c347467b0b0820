//! Database schemas for Cadence
//!
//! MongoDB document structures and their conversions to the domain types.

mod metadata;
mod notification;
mod progress;
mod schedule;

pub use metadata::Metadata;
pub use notification::{NotificationDoc, NOTIFICATION_COLLECTION};
pub use progress::{BadgeDoc, ProgressDoc, PROGRESS_COLLECTION};
pub use schedule::{OccurrenceDoc, ScheduleDoc, SCHEDULE_COLLECTION};
