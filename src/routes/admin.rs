//! Operator routes (dev mode only)

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use std::sync::Arc;
use tracing::info;

use crate::routes::{error_response, respond};
use crate::server::AppState;
use crate::types::CadenceError;

/// Run one reminder sweep immediately (`POST /api/v1/admin/sweep`)
pub async fn handle_run_sweep(state: Arc<AppState>) -> Response<Full<Bytes>> {
    if !state.args.dev_mode {
        return error_response(CadenceError::NotFound(
            "no route for /api/v1/admin/sweep".to_string(),
        ));
    }

    info!("Manual reminder sweep requested");
    respond(StatusCode::OK, state.sweeper.tick().await)
}
