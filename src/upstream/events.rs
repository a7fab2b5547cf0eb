use serde_json::Value;

/// Classified upstream event kinds, each routed independently by the
/// session bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamEventKind {
    /// Service confirmed the connection is open; audio may flow
    Open,
    /// Stream ended (upstream-initiated close or transport loss)
    Close,
    /// Transcript result, interim or final. Forwarded byte-for-byte.
    Transcript,
    /// Utterance boundary; triggers a non-final usage checkpoint
    UtteranceEnd,
    SpeechStarted,
    SpeechEnded,
    Warning,
    Error,
    Metadata,
    /// Anything the service sends that we do not recognize
    Other,
}

impl UpstreamEventKind {
    /// Map the service's `type` discriminator to a kind.
    pub fn from_wire(wire_type: &str) -> Self {
        match wire_type {
            "Open" => Self::Open,
            "Close" => Self::Close,
            "Results" => Self::Transcript,
            "UtteranceEnd" => Self::UtteranceEnd,
            "SpeechStarted" => Self::SpeechStarted,
            "SpeechFinished" => Self::SpeechEnded,
            "Warning" => Self::Warning,
            "Error" => Self::Error,
            "Metadata" => Self::Metadata,
            _ => Self::Other,
        }
    }

    /// Transcript results never contain transport internals and are
    /// forwarded unmodified for latency; everything else is sanitized.
    pub fn skips_sanitization(self) -> bool {
        matches!(self, Self::Transcript)
    }
}

/// One event read off the upstream connection.
#[derive(Debug, Clone)]
pub struct UpstreamEvent {
    /// Which upstream connection produced this event. The bridge drops
    /// events whose epoch does not match its current handle, so a
    /// superseded connection can never act on its successor.
    pub epoch: u64,
    pub kind: UpstreamEventKind,
    /// Original wire text, exactly as received
    pub raw: String,
    /// Parsed payload (`Value::Null` when the frame is not JSON)
    pub payload: Value,
}

impl UpstreamEvent {
    pub fn parse(epoch: u64, raw: String) -> Self {
        let payload: Value = serde_json::from_str(&raw).unwrap_or(Value::Null);
        let kind = payload
            .get("type")
            .and_then(Value::as_str)
            .map_or(UpstreamEventKind::Other, UpstreamEventKind::from_wire);
        Self {
            epoch,
            kind,
            raw,
            payload,
        }
    }

    /// Synthesize a close event when the stream ends without one.
    pub fn synthetic_close(epoch: u64) -> Self {
        Self::parse(epoch, r#"{"type":"Close"}"#.to_string())
    }

    /// Synthesize an error event from a transport failure.
    pub fn synthetic_error(epoch: u64, message: &str) -> Self {
        let raw = serde_json::json!({ "type": "Error", "message": message }).to_string();
        Self::parse(epoch, raw)
    }
}
