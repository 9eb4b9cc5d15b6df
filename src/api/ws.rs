// =============================================================================
// WebSocket Handler — Push-based dashboard updates
// =============================================================================
//
// Clients connect to `/api/v1/ws` and receive:
//   1. An immediate full DashboardSnapshot on connect.
//   2. A fresh snapshot whenever the state_version has changed, checked
//      every 500 ms.
//
// A poll that publishes new quotes or a selection change bumps the version,
// so the dashboard refreshes at the poll cadence without polling itself.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::app_state::AppState;

/// Axum handler for the WebSocket upgrade request.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    info!("WebSocket connection accepted — upgrading");
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Manages a single WebSocket connection lifecycle: push on version change,
/// answer pings, stop on close or error.
async fn handle_ws_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let mut seq: u64 = 0;
    let mut sent_version: u64 = 0;
    if let Err(e) = push_snapshot(&mut sender, &state, &mut seq, &mut sent_version).await {
        warn!(error = %e, "Failed to send initial WebSocket snapshot");
        return;
    }

    let mut push_interval = interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            _ = push_interval.tick() => {
                if state.current_state_version() != sent_version {
                    if let Err(e) =
                        push_snapshot(&mut sender, &state, &mut seq, &mut sent_version).await
                    {
                        debug!(error = %e, "WebSocket send failed — disconnecting");
                        break;
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            debug!(error = %e, "Failed to send Pong — disconnecting");
                            break;
                        }
                    }
                    Some(Ok(Message::Text(_))) => {
                        // Any text frame asks for an immediate refresh.
                        if let Err(e) =
                            push_snapshot(&mut sender, &state, &mut seq, &mut sent_version).await
                        {
                            debug!(error = %e, "WebSocket send failed — disconnecting");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket closed by client");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive error — disconnecting");
                        break;
                    }
                }
            }
        }
    }

    debug!(messages = seq, "WebSocket connection finished");
}

/// Send a snapshot and record the version it reflects. The version is read
/// before the snapshot is built, so a bump racing the send is pushed again on
/// the next tick rather than skipped.
async fn push_snapshot<S>(
    sender: &mut S,
    state: &Arc<AppState>,
    sequence: &mut u64,
    last_sent_version: &mut u64,
) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let version = state.current_state_version();
    send_snapshot(sender, state, sequence).await?;
    *last_sent_version = version;
    Ok(())
}

/// Serialize and send the current DashboardSnapshot.
async fn send_snapshot<S>(
    sender: &mut S,
    state: &Arc<AppState>,
    sequence: &mut u64,
) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    state
        .ws_sequence_number
        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    *sequence += 1;

    let snapshot = state.build_snapshot();

    match serde_json::to_string(&snapshot) {
        Ok(json) => {
            sender.send(Message::Text(json)).await?;
            debug!(
                version = snapshot.state_version,
                seq = *sequence,
                "WebSocket snapshot sent"
            );
            Ok(())
        }
        Err(e) => {
            // Serialisation errors are not network errors; keep the socket.
            warn!(error = %e, "Failed to serialize snapshot");
            Ok(())
        }
    }
}
