//! Session schedule routes
//!
//! - `POST /api/v1/sessions/plan` - install a plan from an assessment result
//! - `POST /api/v1/sessions/complete` - complete the next pending session
//! - `GET /api/v1/sessions/schedule` - the caller's current schedule

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;

use crate::routes::{read_json, require_user, respond};
use crate::schedule::PlanRequest;
use crate::server::AppState;

pub async fn handle_install_plan(state: Arc<AppState>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let result = async {
        let user_id = require_user(&req)?;
        let mut request: PlanRequest = read_json(req).await?;
        request.user_id = user_id;
        state.scheduling.install_plan(request).await
    }
    .await;

    respond(StatusCode::CREATED, result)
}

pub async fn handle_complete_session(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let result = async {
        let user_id = require_user(&req)?;
        state.completion.complete_next(&user_id).await
    }
    .await;

    respond(StatusCode::OK, result)
}

pub async fn handle_get_schedule(state: Arc<AppState>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let result = async {
        let user_id = require_user(&req)?;
        state.scheduling.schedule_for(&user_id).await
    }
    .await;

    respond(StatusCode::OK, result)
}
