//! Shared types for Cadence

pub mod error;

pub use error::{CadenceError, Result};
