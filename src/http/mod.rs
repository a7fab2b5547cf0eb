//! HTTP surface: the client WebSocket endpoint plus introspection.
//!
//! - GET /ws      - admit and upgrade to a bridged transcription session
//! - GET /sessions - live session count and summaries
//! - GET /health  - health check

mod handlers;
mod routes;
mod state;

pub use handlers::WsClientSocket;
pub use routes::create_router;
pub use state::AppState;
