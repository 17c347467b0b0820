//! Notification inbox routes
//!
//! Every operation is scoped to the caller; touching someone else's
//! notification reports `NotFound`.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::routes::{error_response, not_found_response, require_user, respond};
use crate::server::AppState;
use crate::store::NotificationRecord;
use crate::types::{CadenceError, Result};

const PREFIX: &str = "/api/v1/notifications";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxResponse {
    pub notifications: Vec<NotificationRecord>,
    pub unread: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountResponse {
    pub count: u64,
}

/// Inbox route for a method and path below the notifications prefix
#[derive(Debug, PartialEq, Eq)]
enum InboxRoute {
    List,
    ReadAll,
    Read(String),
    ClearAll,
    Delete(String),
}

fn route(method: &Method, path: &str) -> Option<InboxRoute> {
    let rest = path.strip_prefix(PREFIX)?.trim_end_matches('/');
    let rest = rest.strip_prefix('/').unwrap_or(rest);

    match (method, rest) {
        (&Method::GET, "") => Some(InboxRoute::List),
        (&Method::PATCH, "read-all") => Some(InboxRoute::ReadAll),
        (&Method::DELETE, "clear-all") => Some(InboxRoute::ClearAll),
        (&Method::PATCH, r) => r
            .strip_prefix("read/")
            .filter(|id| !id.is_empty() && !id.contains('/'))
            .map(|id| InboxRoute::Read(id.to_string())),
        (&Method::DELETE, id) if !id.is_empty() && !id.contains('/') => {
            Some(InboxRoute::Delete(id.to_string()))
        }
        _ => None,
    }
}

fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|_| CadenceError::BadRequest(format!("invalid notification id: {}", raw)))
}

pub async fn handle_notifications_request(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let path = req.uri().path().to_string();
    let Some(route) = route(req.method(), &path) else {
        return not_found_response(&path);
    };

    let user_id = match require_user(&req) {
        Ok(id) => id,
        Err(e) => return error_response(e),
    };
    let ledger = &state.stores.ledger;

    match route {
        InboxRoute::List => {
            let result = ledger.list_for_user(&user_id).await.map(|notifications| {
                let unread = notifications.iter().filter(|n| !n.is_read).count();
                InboxResponse {
                    notifications,
                    unread,
                }
            });
            respond(StatusCode::OK, result)
        }
        InboxRoute::ReadAll => {
            let result = ledger
                .mark_all_read(&user_id)
                .await
                .map(|count| CountResponse { count });
            respond(StatusCode::OK, result)
        }
        InboxRoute::Read(raw) => {
            let result = async {
                let id = parse_id(&raw)?;
                ledger.mark_read(&user_id, id).await?.ok_or_else(|| {
                    CadenceError::NotFound(format!("notification {} not found", id))
                })
            }
            .await;
            respond(StatusCode::OK, result)
        }
        InboxRoute::ClearAll => {
            let result = ledger
                .clear(&user_id)
                .await
                .map(|count| CountResponse { count });
            respond(StatusCode::OK, result)
        }
        InboxRoute::Delete(raw) => {
            let result = async {
                let id = parse_id(&raw)?;
                if ledger.delete(&user_id, id).await? {
                    Ok(CountResponse { count: 1 })
                } else {
                    Err(CadenceError::NotFound(format!("notification {} not found", id)))
                }
            }
            .await;
            respond(StatusCode::OK, result)
        }
    }
}
