//! Push channel: every connected display receives status and config events.

use std::sync::Arc;

use axum::{extract::{ws::{Message, WebSocket, WebSocketUpgrade}, State}, response::IntoResponse};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::events::DashboardEvent;
use crate::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn encode(event: &DashboardEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            warn!("failed to encode event: {}", e);
            None
        }
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    // subscribe before the snapshot so nothing published in between is lost
    let mut events = state.notifier.subscribe();
    info!(clients = state.notifier.subscriber_count(), "display connected");

    let hello = DashboardEvent::Status(state.controller.status().await);
    if let Some(msg) = encode(&hello) {
        if sender.send(msg).await.is_err() {
            debug!("display left before the initial status");
            return;
        }
    }

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // displays only listen
                Some(Ok(_)) => {}
            },
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "display lagging, sending fresh status");
                        DashboardEvent::Status(state.controller.snapshot_now())
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(msg) = encode(&event) else { continue };
                if sender.send(msg).await.is_err() {
                    break;
                }
            }
        }
    }
    info!(clients = state.notifier.subscriber_count().saturating_sub(1), "display disconnected");
}
