//! Database layer for Cadence
//!
//! MongoDB storage for session schedules, the notification ledger and user
//! progress.

pub mod mongo;
pub mod schemas;

pub use mongo::{MongoClient, MongoCollection};
pub use schemas::{Metadata, NotificationDoc, ProgressDoc, ScheduleDoc};
