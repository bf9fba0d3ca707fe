//! WebSocket upgrade and per-subscriber forwarding. Each connection gets
//! its own hub receiver and its own task, so one stuck or closed socket
//! never blocks delivery to the rest.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::stream::StreamExt;
use serde::Serialize;
use tracing::debug;

use crate::hub::CycleUpdate;
use crate::state::AppState;
use crate::types::MetricsSnapshot;

/// Wire frame for one cycle: the nested snapshot shape, plus a degraded
/// marker only when durable storage missed this cycle.
#[derive(Serialize)]
struct LiveFrame<'a> {
    #[serde(flatten)]
    snapshot: &'a MetricsSnapshot,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    degraded: bool,
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut rx = state.hub.subscribe();
    debug!(
        subscribers = state.hub.subscriber_count(),
        "live subscriber connected"
    );

    loop {
        tokio::select! {
            update = rx.recv() => {
                let Ok(update) = update else {
                    // Lagged past the buffer or the hub went away; either
                    // way this subscriber is done.
                    break;
                };
                if send_update(&mut socket, &update).await.is_err() {
                    break;
                }
            }
            msg = socket.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Inbound frames are ignored; this channel is push-only.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    debug!("live subscriber disconnected");
}

async fn send_update(socket: &mut WebSocket, update: &CycleUpdate) -> Result<(), ()> {
    let frame = LiveFrame {
        snapshot: &update.snapshot,
        degraded: update.degraded,
    };
    let json = match serde_json::to_string(&frame) {
        Ok(j) => j,
        Err(e) => {
            debug!(error = %e, "failed to encode live frame");
            return Ok(()); // skip this frame, keep the subscriber
        }
    };
    socket.send(Message::Text(json)).await.map_err(|_| ())
}
