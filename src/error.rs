use std::time::Duration;

use thiserror::Error;

/// Rejection raised by the admission collaborator before any session exists.
///
/// Carried as a numeric code plus message so the client (and the HTTP
/// rejection body) can present a structured error. The connection is never
/// upgraded when one of these fires.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("admission rejected ({code}): {message}")]
pub struct PreAdmissionError {
    pub code: u16,
    pub message: String,
}

impl PreAdmissionError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Failures at the upstream transcription service boundary.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// No open confirmation arrived within the connect bound.
    #[error("upstream open confirmation not received within {0:?}")]
    Timeout(Duration),

    /// Connection construction itself failed (DNS, TCP, handshake).
    #[error("upstream connection failed: {0}")]
    Init(String),

    /// A write was attempted on a handle that is not ready or already
    /// finished.
    #[error("upstream connection not ready")]
    NotReady,

    /// The underlying transport rejected a media write.
    #[error("upstream write failed: {0}")]
    Send(String),

    /// The upstream closed the stream before the open confirmation.
    #[error("upstream closed before confirming open")]
    ClosedBeforeOpen,
}
