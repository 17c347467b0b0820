//! Cadence - therapy session scheduler and notification delivery
//!
//! Turns a clinical recommendation ("weekly, 8 sessions") into a dated plan,
//! advances it as sessions are completed, sweeps for due reminders, and
//! delivers notifications to users over a live WebSocket channel with a
//! durable ledger behind it for replay on reconnect.
//!
//! ## Services
//!
//! - **Plan**: pure plan generation from frequency, count and start instant
//! - **Schedule**: per-user schedule installation and lookup
//! - **Completion**: the per-user completion state machine and badges
//! - **Sweeper**: recurring scan for due reminders (email + live notification)
//! - **Delivery**: persist-then-push notification delivery with replay
//! - **Presence**: which users currently hold a live channel

pub mod clock;
pub mod completion;
pub mod config;
pub mod db;
pub mod delivery;
pub mod mail;
pub mod presence;
pub mod routes;
pub mod schedule;
pub mod server;
pub mod store;
pub mod sweeper;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{CadenceError, Result};
