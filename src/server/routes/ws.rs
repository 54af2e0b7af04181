//! Slide event stream
//!
//! One JSON text frame per event, replayed history first. The socket is
//! closed after the terminal event or when the subscriber falls behind.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::error::Result;
use crate::server::server_core::AppState;
use crate::session::{EventSubscription, SessionId};

pub async fn slide_stream(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response> {
    let id: SessionId = id.parse()?;
    // subscribe before upgrading so unknown sessions get a plain 404
    let subscription = state.registry.subscribe(&id)?;
    Ok(ws.on_upgrade(move |socket| stream_events(socket, id, subscription)))
}

async fn stream_events(socket: WebSocket, id: SessionId, mut subscription: EventSubscription) {
    let (mut sender, mut receiver) = socket.split();
    debug!(session = %id, replay = subscription.pending_replay(), "subscriber connected");

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                };
                let text = match serde_json::to_string(event.as_ref()) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(session = %id, seq = event.seq, error = %e, "failed to encode event");
                        continue;
                    }
                };
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Ping(payload))) => {
                    if sender.send(Message::Pong(payload)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!(session = %id, "subscriber disconnected");
}
