//! Live notification channel
//!
//! ## Protocol
//!
//! Connect: `ws://localhost:8080/ws`
//!
//! Messages (client → server):
//! - `register` - bind this socket to a user; replays missed notifications
//! - `ping` - keep-alive
//!
//! Messages (server → client):
//! - `registered` - registration accepted, with the number of replayed notifications
//! - `notification` - one notification
//! - `pong`
//! - `error`
//!
//! ```json
//! {"type": "register", "userId": "665f1c..."}
//! {"type": "registered", "replayed": 2}
//! {"type": "notification", "data": {"id": "...", "title": "Session Today!", "message": "...", "time": "2024-01-08T09:00:00Z", "isRead": false}}
//! ```

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::delivery::DeliveryCoordinator;
use crate::presence::{ChannelHandle, PushMessage};
use crate::routes::error_response;
use crate::server::AppState;
use crate::types::{CadenceError, Result};

/// WebSocket type after upgrade
type HyperWebSocket =
    hyper_tungstenite::WebSocketStream<hyper_util::rt::TokioIo<hyper::upgrade::Upgraded>>;

/// Message received from client
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Register {
        #[serde(rename = "userId")]
        user_id: String,
    },
    Ping,
}

/// Control message sent to client
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Registered { replayed: usize },
    Pong,
    Error { message: String },
}

/// Handle WebSocket upgrade for the live channel
pub async fn handle_live_channel(state: Arc<AppState>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    if !hyper_tungstenite::is_upgrade_request(&req) {
        return error_response(CadenceError::BadRequest(
            "WebSocket upgrade required".to_string(),
        ));
    }

    let (response, websocket) = match hyper_tungstenite::upgrade(req, None) {
        Ok(upgrade) => upgrade,
        Err(e) => {
            error!("WebSocket upgrade failed: {}", e);
            let mut response = Response::new(Full::new(Bytes::from("WebSocket upgrade failed")));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            return response;
        }
    };

    let delivery = Arc::clone(&state.delivery);
    tokio::spawn(async move {
        match websocket.await {
            Ok(ws) => {
                if let Err(e) = serve_channel(ws, delivery).await {
                    warn!("Live channel error: {}", e);
                }
            }
            Err(e) => {
                error!("WebSocket connection failed: {}", e);
            }
        }
    });

    let (parts, _body) = response.into_parts();
    Response::from_parts(parts, Full::new(Bytes::new()))
}

fn frame(message: &ServerFrame) -> Result<WsMessage> {
    Ok(WsMessage::Text(serde_json::to_string(message)?))
}

/// Pump one socket until it closes.
///
/// Pushes queued on the channel handle are written out as they arrive;
/// client frames are handled in between.
async fn serve_channel(ws: HyperWebSocket, delivery: Arc<DeliveryCoordinator>) -> Result<()> {
    let (mut sender, mut receiver) = ws.split();
    let (handle, mut pushes) = ChannelHandle::new();
    debug!(connection = handle.id().0, "Live channel opened");

    let outcome: Result<()> = async {
        loop {
            tokio::select! {
                Some(push) = pushes.recv() => {
                    let json = serde_json::to_string(&push)?;
                    sender.send(WsMessage::Text(json)).await?;
                }

                msg = receiver.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            let reply = match serde_json::from_str::<ClientFrame>(&text) {
                                Ok(ClientFrame::Register { user_id }) => {
                                    register(&delivery, &handle, user_id.trim()).await
                                }
                                Ok(ClientFrame::Ping) => ServerFrame::Pong,
                                Err(e) => ServerFrame::Error {
                                    message: format!("Unrecognized message: {}", e),
                                },
                            };
                            sender.send(frame(&reply)?).await?;
                        }
                        Some(Ok(WsMessage::Ping(data))) => {
                            sender.send(WsMessage::Pong(data)).await?;
                        }
                        Some(Ok(WsMessage::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                    }
                }
            }
        }
        Ok(())
    }
    .await;

    close_channel(&delivery, &handle, pushes).await;
    debug!(connection = handle.id().0, "Live channel closed");
    outcome
}

/// Release the push queue before leaving presence, so a `deliver` racing the
/// close gets a failed push instead of queueing into a socket nobody drains.
async fn close_channel(
    delivery: &DeliveryCoordinator,
    handle: &ChannelHandle,
    pushes: UnboundedReceiver<PushMessage>,
) {
    drop(pushes);
    delivery.on_disconnect(handle).await;
}

async fn register(delivery: &DeliveryCoordinator, handle: &ChannelHandle, user_id: &str) -> ServerFrame {
    if user_id.is_empty() {
        return ServerFrame::Error {
            message: "userId is required".to_string(),
        };
    }

    match delivery.on_connect(user_id, handle.clone()).await {
        Ok(summary) => {
            info!(user_id = %user_id, replayed = summary.replayed, "Live channel registered");
            ServerFrame::Registered {
                replayed: summary.replayed,
            }
        }
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Registration replay failed");
            ServerFrame::Error {
                message: e.to_string(),
            }
        }
    }
}
