//! Session schedules
//!
//! Plan generation, the schedule model with its completion cursor, and the
//! service that installs a plan for a user.

pub mod model;
pub mod plan;
pub mod service;

pub use model::{CompletedStep, Occurrence, ScheduleOwner, ScheduleState, SessionSchedule};
pub use plan::{generate, Frequency};
pub use service::{
    format_session_date, modify_schedule, Mutation, PlanRequest, ScheduleService,
    MAX_WRITE_ATTEMPTS,
};
