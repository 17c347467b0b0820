//! Cadence - therapy session scheduler and notification delivery

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cadence::{
    clock::SystemClock,
    config::Args,
    db::MongoClient,
    mail::{HttpMailer, LogMailer, Mailer},
    server::{self, AppState, Stores},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("cadence={},info", args.log_level).into());
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Connect to MongoDB (optional in dev mode)
    let stores = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => {
            info!("MongoDB connected successfully");
            Stores::mongo(&client).await?
        }
        Err(e) => {
            if args.dev_mode {
                warn!("MongoDB connection failed (dev mode, using in-memory stores): {}", e);
                Stores::memory()
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let mailer: Arc<dyn Mailer> = match args.mail_api_url {
        Some(ref url) => Arc::new(HttpMailer::new(
            url.clone(),
            args.mail_api_key.clone(),
            args.mail_from.clone(),
            args.mail_timeout(),
        )?),
        None => {
            warn!("MAIL_API_URL not set (dev mode, reminder emails are only logged)");
            Arc::new(LogMailer)
        }
    };

    let state = Arc::new(AppState::new(
        args.clone(),
        stores,
        mailer,
        Arc::new(SystemClock),
    ));

    info!("======================================");
    info!("  Cadence - session scheduler");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Store: {}", state.stores.backend);
    info!("Mail: {} (timeout {:?})", state.mailer.describe(), args.mail_timeout());
    info!("Sweep: {}", args.sweep_cadence().describe());
    info!("======================================");

    let _sweeper = Arc::clone(&state.sweeper).spawn();

    if let Err(e) = server::run(state).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}
