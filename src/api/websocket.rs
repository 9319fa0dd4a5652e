//! WebSocket transcript channel
//!
//! The browser streams final speech-to-text transcripts here and receives
//! the assistant's reply for each one. Every connection owns its own
//! conversation log for its lifetime.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::ApiState;
use crate::conversation::SharedLog;

/// Incoming WebSocket message from client
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WsIncoming {
    /// A finalized utterance
    Transcript {
        #[serde(default)]
        transcript: String,
    },
    /// Ping to keep connection alive
    Ping,
}

/// Outgoing WebSocket message to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WsOutgoing {
    /// Connection established
    Connected {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    /// Reply to a transcript (or the fallback apology)
    AssistantResponse { response: String },
    /// Error occurred
    Error { code: String, message: String },
    /// Pong response
    Pong,
}

impl WsOutgoing {
    fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Build WebSocket router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new().route("/ws", get(ws_upgrade)).with_state(state)
}

/// Handle WebSocket upgrade request
async fn ws_upgrade(State(state): State<Arc<ApiState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<ApiState>) {
    let (mut sender, mut receiver) = socket.split();

    let session_id = uuid::Uuid::new_v4().to_string();
    let log = state.sessions.open(&session_id).await;

    let connected = WsOutgoing::Connected {
        session_id: session_id.clone(),
    };
    if let Ok(msg) = serde_json::to_string(&connected) {
        if sender.send(Message::Text(msg.into())).await.is_err() {
            state.sessions.close(&session_id).await;
            return;
        }
    }

    tracing::info!(session_id = %session_id, "WebSocket connected");

    let (tx, mut rx) = mpsc::channel::<WsOutgoing>(32);

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(text) = serde_json::to_string(&msg) {
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    let recv_state = Arc::clone(&state);
    let recv_session = session_id.clone();
    let mut recv_task = tokio::spawn(async move {
        // One frame at a time: transcripts are answered in arrival order
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let reply = handle_message(&text, &recv_state, &log).await;
                    if tx.send(reply).await.is_err() {
                        break;
                    }
                }
                Message::Ping(data) => {
                    tracing::trace!(len = data.len(), "received ping");
                }
                Message::Close(_) => {
                    tracing::info!(session_id = %recv_session, "WebSocket closed by client");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.sessions.close(&session_id).await;
    tracing::info!(session_id = %session_id, "WebSocket disconnected");
}

/// Handle a single text frame
async fn handle_message(text: &str, state: &ApiState, log: &SharedLog) -> WsOutgoing {
    match serde_json::from_str::<WsIncoming>(text) {
        Ok(WsIncoming::Ping) => WsOutgoing::Pong,
        Ok(WsIncoming::Transcript { transcript }) => {
            handle_transcript(state, log, &transcript).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "rejecting malformed frame");
            WsOutgoing::error("invalid_message", format!("invalid message: {e}"))
        }
    }
}

/// Relay one transcript through the session's log
///
/// Completion errors are answered with the fallback reply, so the client
/// always has something to speak. The connection is never closed here.
pub async fn handle_transcript(state: &ApiState, log: &SharedLog, transcript: &str) -> WsOutgoing {
    let Some(relay) = state.relay.as_ref() else {
        return WsOutgoing::error("no_provider", "no completion provider configured");
    };

    tracing::info!(transcript_len = transcript.len(), "transcript received");

    let outcome = {
        let mut log = log.lock().await;
        relay.ask(&mut log, transcript).await
    };

    match relay.reply_or_fallback(outcome) {
        Ok(response) => WsOutgoing::AssistantResponse { response },
        Err(crate::Error::MissingInput(field)) => {
            WsOutgoing::error("missing_input", format!("{field} is required"))
        }
        Err(e) => {
            tracing::error!(error = %e, "transcript handling failed");
            WsOutgoing::error("internal_error", e.to_string())
        }
    }
}
