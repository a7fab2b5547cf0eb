use super::state::AppState;
use crate::auth::CODE_BALANCE_EXHAUSTED;
use crate::session::{ClientFrame, ClientSocket, SessionBridge, SessionSummary};
use async_trait::async_trait;
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Media frames are small PCM chunks; anything near this size is not a
/// legitimate client frame.
const MAX_CLIENT_MESSAGE_BYTES: usize = 1024 * 1024;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Credential token for the pre-admission check
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PreAdmissionResponse {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub count: usize,
    pub sessions: Vec<SessionSummary>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /ws
/// Admit, then upgrade to a bridged transcription session. A rejected
/// request is answered with a structured error and never upgraded.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let admission = match state.admission.admit(query.token.as_deref()).await {
        Ok(admission) => admission,
        Err(err) => {
            info!(code = err.code, "connection rejected before admission");
            let status = if err.code == CODE_BALANCE_EXHAUSTED {
                StatusCode::PAYMENT_REQUIRED
            } else {
                StatusCode::UNAUTHORIZED
            };
            let body = PreAdmissionResponse {
                code: err.code,
                message: err.message,
            };
            return (status, Json(body)).into_response();
        }
    };

    ws.max_message_size(MAX_CLIENT_MESSAGE_BYTES)
        .on_upgrade(move |socket| async move {
            let bridge = SessionBridge::new(
                WsClientSocket::new(socket),
                admission,
                state.registry.clone(),
                state.ledger.clone(),
                (*state.bridge_config).clone(),
            );
            state.sessions.spawn(bridge.run());
        })
        .into_response()
}

/// GET /sessions
/// Live session count and summaries
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.registry.summaries().await;
    Json(SessionsResponse {
        count: sessions.len(),
        sessions,
    })
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

// ============================================================================
// WebSocket adapter
// ============================================================================

/// Adapts axum's `WebSocket` to the bridge's `ClientSocket` interface.
pub struct WsClientSocket {
    socket: WebSocket,
}

impl WsClientSocket {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl ClientSocket for WsClientSocket {
    async fn recv(&mut self) -> Option<Result<ClientFrame, String>> {
        match self.socket.recv().await? {
            Ok(message) => Some(Ok(match message {
                Message::Text(text) => ClientFrame::Text(text),
                Message::Binary(data) => ClientFrame::Binary(data),
                Message::Ping(data) => ClientFrame::Ping(data),
                Message::Pong(data) => ClientFrame::Pong(data),
                Message::Close(frame) => {
                    ClientFrame::Close(frame.map(|f| (f.code, f.reason.to_string())))
                }
            })),
            Err(e) => Some(Err(e.to_string())),
        }
    }

    async fn send(&mut self, frame: ClientFrame) -> Result<(), String> {
        let message = match frame {
            ClientFrame::Text(text) => Message::Text(text),
            ClientFrame::Binary(data) => Message::Binary(data),
            ClientFrame::Ping(data) => Message::Ping(data),
            ClientFrame::Pong(data) => Message::Pong(data),
            ClientFrame::Close(frame) => Message::Close(frame.map(|(code, reason)| CloseFrame {
                code,
                reason: reason.into(),
            })),
        };
        self.socket.send(message).await.map_err(|e| e.to_string())
    }
}
