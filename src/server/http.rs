//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. WebSocket upgrades on
//! `/ws` are handed to the live channel handler.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::completion::CompletionService;
use crate::config::Args;
use crate::db::MongoClient;
use crate::delivery::DeliveryCoordinator;
use crate::mail::Mailer;
use crate::presence::{LocalPresence, PresenceStore};
use crate::routes;
use crate::schedule::ScheduleService;
use crate::server::websocket;
use crate::store::{
    MemoryNotificationLedger, MemoryProgressStore, MemoryScheduleStore, MongoNotificationLedger,
    MongoProgressStore, MongoScheduleStore, NotificationLedger, ProgressStore, ScheduleStore,
};
use crate::sweeper::ReminderSweeper;
use crate::types::CadenceError;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// The three durable stores
#[derive(Clone)]
pub struct Stores {
    pub schedules: Arc<dyn ScheduleStore>,
    pub ledger: Arc<dyn NotificationLedger>,
    pub progress: Arc<dyn ProgressStore>,
    /// "mongodb" or "memory", for logs and /health
    pub backend: &'static str,
}

impl Stores {
    pub fn memory() -> Self {
        Self {
            schedules: Arc::new(MemoryScheduleStore::new()),
            ledger: Arc::new(MemoryNotificationLedger::new()),
            progress: Arc::new(MemoryProgressStore::new()),
            backend: "memory",
        }
    }

    pub async fn mongo(client: &MongoClient) -> Result<Self, CadenceError> {
        Ok(Self {
            schedules: Arc::new(MongoScheduleStore::new(client).await?),
            ledger: Arc::new(MongoNotificationLedger::new(client).await?),
            progress: Arc::new(MongoProgressStore::new(client).await?),
            backend: "mongodb",
        })
    }
}

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub stores: Stores,
    pub presence: Arc<dyn PresenceStore>,
    pub delivery: Arc<DeliveryCoordinator>,
    pub scheduling: Arc<ScheduleService>,
    pub completion: Arc<CompletionService>,
    pub sweeper: Arc<ReminderSweeper>,
    pub mailer: Arc<dyn Mailer>,
    pub clock: Arc<dyn Clock>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire every service over the given stores
    pub fn new(args: Args, stores: Stores, mailer: Arc<dyn Mailer>, clock: Arc<dyn Clock>) -> Self {
        let presence = LocalPresence::shared();
        let delivery = Arc::new(DeliveryCoordinator::new(
            stores.ledger.clone(),
            presence.clone(),
            clock.clone(),
        ));
        let scheduling = Arc::new(ScheduleService::new(
            stores.schedules.clone(),
            stores.progress.clone(),
            delivery.clone(),
            clock.clone(),
        ));
        let completion = Arc::new(CompletionService::new(
            stores.schedules.clone(),
            stores.progress.clone(),
            delivery.clone(),
            clock.clone(),
        ));
        let sweeper = Arc::new(ReminderSweeper::new(
            stores.schedules.clone(),
            mailer.clone(),
            delivery.clone(),
            clock.clone(),
            args.sweep_config(),
        ));

        Self {
            args,
            stores,
            presence,
            delivery,
            scheduling,
            completion,
            sweeper,
            mailer,
            clock,
            started_at: Instant::now(),
        }
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), CadenceError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Cadence listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - /api/v1/admin/sweep is open");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .with_upgrades()
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        (Method::OPTIONS, _) => preflight_response(),

        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state)).await
        }

        (Method::GET, "/version") => routes::version_info(),

        (Method::GET, "/ws") => websocket::handle_live_channel(Arc::clone(&state), req).await,

        (Method::POST, "/api/v1/sessions/plan") => {
            routes::handle_install_plan(Arc::clone(&state), req).await
        }

        (Method::POST, "/api/v1/sessions/complete") => {
            routes::handle_complete_session(Arc::clone(&state), req).await
        }

        (Method::GET, "/api/v1/sessions/schedule") => {
            routes::handle_get_schedule(Arc::clone(&state), req).await
        }

        (Method::POST, "/api/v1/admin/sweep") => {
            routes::handle_run_sweep(Arc::clone(&state)).await
        }

        (_, p) if p.starts_with("/api/v1/notifications") => {
            routes::handle_notifications_request(Arc::clone(&state), req).await
        }

        _ => routes::not_found_response(&path),
    };

    Ok(to_boxed(response))
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PATCH, DELETE, OPTIONS"),
    );
    response
}
