use serde::{Deserialize, Serialize};

/// Gateway-originated messages sent to the client, JSON-encoded with a
/// `type` discriminator. Upstream events are forwarded separately (raw
/// for transcripts, sanitized JSON for everything else) and keep the
/// service's own `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Single acknowledgment sent once the upstream connection is open
    Ready {
        session_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        remaining_secs: Option<f64>,
    },
    Error {
        code: u16,
        message: String,
    },
}

/// Error codes carried in client-bound `error` messages.
pub const CODE_UPSTREAM_UNAVAILABLE: u16 = 1001;
pub const CODE_PROCESSING_FAILED: u16 = 1003;

/// Structured control messages a client may send as text frames.
/// Unrecognized types parse as `Unknown` and are ignored by contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    Start,
    Stop,
    #[serde(other)]
    Unknown,
}
