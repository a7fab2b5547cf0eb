//! Client connection abstraction.
//!
//! The bridge runs against this narrow interface rather than a concrete
//! WebSocket type, so the same message loop serves the axum endpoint in
//! production and scripted connections in tests.

use async_trait::async_trait;

/// One frame on the client connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    /// Close with an optional code and reason
    Close(Option<(u16, String)>),
}

/// Bidirectional client connection as seen by the session bridge.
#[async_trait]
pub trait ClientSocket: Send {
    /// Next inbound frame; `None` when the client is gone.
    async fn recv(&mut self) -> Option<Result<ClientFrame, String>>;

    /// Send one frame to the client.
    async fn send(&mut self, frame: ClientFrame) -> Result<(), String>;
}
