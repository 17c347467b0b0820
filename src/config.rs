//! Configuration for Cadence
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

use crate::sweeper::{SweepCadence, SweepConfig};

/// Cadence - therapy session scheduler and notification delivery
#[derive(Parser, Debug, Clone)]
#[command(name = "cadence")]
#[command(about = "Therapy session scheduler with live notification delivery")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (in-memory fallback, log mailer, admin sweep route)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "cadence")]
    pub mongodb_db: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// UTC hour of the daily reminder sweep
    #[arg(long, env = "SWEEP_HOUR", default_value = "9")]
    pub sweep_hour: u32,

    /// Fixed sweep interval in seconds; overrides SWEEP_HOUR
    #[arg(long, env = "SWEEP_INTERVAL_SECS")]
    pub sweep_interval_secs: Option<u64>,

    /// Per-email send timeout in milliseconds
    #[arg(long, env = "MAIL_TIMEOUT_MS", default_value = "15000")]
    pub mail_timeout_ms: u64,

    /// HTTP mail relay endpoint (required in production)
    #[arg(long, env = "MAIL_API_URL")]
    pub mail_api_url: Option<String>,

    /// Bearer key for the mail relay
    #[arg(long, env = "MAIL_API_KEY")]
    pub mail_api_key: Option<String>,

    /// Sender address on reminder emails
    #[arg(long, env = "MAIL_FROM", default_value = "Virtual Therapist <no-reply@localhost>")]
    pub mail_from: String,
}

impl Args {
    pub fn mail_timeout(&self) -> Duration {
        Duration::from_millis(self.mail_timeout_ms)
    }

    pub fn sweep_cadence(&self) -> SweepCadence {
        match self.sweep_interval_secs {
            Some(secs) => SweepCadence::Every(Duration::from_secs(secs)),
            None => SweepCadence::DailyAt {
                hour: self.sweep_hour,
            },
        }
    }

    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            cadence: self.sweep_cadence(),
            mail_timeout: self.mail_timeout(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.sweep_hour >= 24 {
            return Err(format!("SWEEP_HOUR must be 0-23, got {}", self.sweep_hour));
        }

        if self.sweep_interval_secs == Some(0) {
            return Err("SWEEP_INTERVAL_SECS must be greater than zero".to_string());
        }

        if self.mail_timeout_ms == 0 {
            return Err("MAIL_TIMEOUT_MS must be greater than zero".to_string());
        }

        if !self.dev_mode && self.mail_api_url.is_none() {
            return Err("MAIL_API_URL is required in production mode".to_string());
        }

        Ok(())
    }
}
