//! HTTP routes for Cadence
//!
//! Authentication happens upstream; the gateway forwards the caller's id in
//! the `X-User-Id` header.

pub mod admin;
pub mod health;
pub mod notifications;
pub mod sessions;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;

use crate::types::CadenceError;

pub use admin::handle_run_sweep;
pub use health::{health_check, version_info};
pub use notifications::handle_notifications_request;
pub use sessions::{handle_complete_session, handle_get_schedule, handle_install_plan};

/// Header carrying the authenticated user id
pub const USER_ID_HEADER: &str = "x-user-id";

/// Largest JSON body accepted
const MAX_BODY_BYTES: usize = 64 * 1024;

/// JSON response with the given status
pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => with_json_headers(status, Bytes::from(body)),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            error_response(CadenceError::Internal("serialization failed".to_string()))
        }
    }
}

/// Render an error as `{"error": kind, "message": ...}`
pub fn error_response(err: CadenceError) -> Response<Full<Bytes>> {
    let (status, body) = err.into_status_code_and_body();
    with_json_headers(status, Bytes::from(body))
}

pub fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    error_response(CadenceError::NotFound(format!("no route for {}", path)))
}

fn with_json_headers(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

/// Caller identity from the gateway header
pub fn require_user(req: &Request<Incoming>) -> Result<String, CadenceError> {
    req.headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| CadenceError::Unauthorized("missing X-User-Id header".to_string()))
}

/// Read and decode a JSON body, treating an empty body as `{}`
pub async fn read_json<T: DeserializeOwned>(req: Request<Incoming>) -> Result<T, CadenceError> {
    let body = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| CadenceError::BadRequest(format!("Failed to read body: {}", e)))?
        .to_bytes();

    let body: &[u8] = if body.is_empty() { b"{}" } else { &body };
    serde_json::from_slice(body)
        .map_err(|e| CadenceError::BadRequest(format!("Invalid JSON: {}", e)))
}

/// Collapse a handler result into a response
pub fn respond<T: Serialize>(status: StatusCode, result: Result<T, CadenceError>) -> Response<Full<Bytes>> {
    match result {
        Ok(value) => json_response(status, &value),
        Err(e) => {
            if e.status_code().is_server_error() {
                error!(error = %e, "Request failed");
            }
            error_response(e)
        }
    }
}
