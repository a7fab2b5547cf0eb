use std::fmt::Write as _;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::events::{UpstreamEvent, UpstreamEventKind};
use crate::error::UpstreamError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection settings for the transcription service.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub url: String,
    /// Service credential, carried as `Authorization: Token <credential>`
    pub credential: String,
    /// Opaque recognition parameters, appended to the URL query string
    pub recognition: Value,
    /// Bound on the whole connect, handshake plus open confirmation
    pub connect_timeout: Duration,
}

/// One live connection to the transcription service.
///
/// A handle only exists once the service's open confirmation has been
/// observed, so no audio can be sent to an unconfirmed stream. At most
/// one handle is current for a session; the bridge finalizes the old one
/// before installing a replacement.
pub struct UpstreamHandle {
    epoch: u64,
    sink: SplitSink<WsStream, Message>,
    reader: JoinHandle<()>,
    finished: bool,
}

impl UpstreamHandle {
    /// Connect, then wait for the service's open confirmation. Events
    /// read from the connection are stamped with `epoch` and forwarded
    /// to `events` for the session's lifetime.
    pub async fn connect(
        config: &UpstreamConfig,
        epoch: u64,
        events: mpsc::Sender<UpstreamEvent>,
    ) -> Result<Self, UpstreamError> {
        let deadline = Instant::now() + config.connect_timeout;

        let url = build_url(&config.url, &config.recognition);
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| UpstreamError::Init(e.to_string()))?;
        let header = HeaderValue::from_str(&format!("Token {}", config.credential))
            .map_err(|e| UpstreamError::Init(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, header);

        debug!(epoch, "connecting to upstream");
        let (ws, _response) = tokio::time::timeout_at(deadline, connect_async(request))
            .await
            .map_err(|_| UpstreamError::Timeout(config.connect_timeout))?
            .map_err(|e| UpstreamError::Init(e.to_string()))?;

        let (sink, stream) = ws.split();
        let (open_tx, open_rx) = oneshot::channel();
        let reader = tokio::spawn(read_loop(stream, epoch, events, open_tx));

        match tokio::time::timeout_at(deadline, open_rx).await {
            Ok(Ok(())) => {
                info!(epoch, "upstream connection open");
                Ok(Self {
                    epoch,
                    sink,
                    reader,
                    finished: false,
                })
            }
            Ok(Err(_)) => {
                // Reader ended before the open confirmation arrived
                reader.abort();
                Err(UpstreamError::ClosedBeforeOpen)
            }
            Err(_) => {
                reader.abort();
                Err(UpstreamError::Timeout(config.connect_timeout))
            }
        }
    }

    /// Forward one binary media frame.
    pub async fn send(&mut self, payload: Vec<u8>) -> Result<(), UpstreamError> {
        if self.finished {
            return Err(UpstreamError::NotReady);
        }
        self.sink
            .send(Message::Binary(payload))
            .await
            .map_err(|e| UpstreamError::Send(e.to_string()))
    }

    /// Request graceful closure. Safe to call more than once and safe on
    /// a connection the service already closed.
    pub async fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        if let Err(e) = self
            .sink
            .send(Message::Text(r#"{"type":"CloseStream"}"#.to_string()))
            .await
        {
            debug!(epoch = self.epoch, "close-stream send failed: {e}");
        }
        if let Err(e) = self.sink.send(Message::Close(None)).await {
            debug!(epoch = self.epoch, "close frame send failed: {e}");
        }

        // We initiated the close; nothing further from this connection
        // is wanted, and the stream must not outlive the handle.
        self.reader.abort();
        info!(epoch = self.epoch, "upstream connection finished");
    }
}

impl Drop for UpstreamHandle {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    epoch: u64,
    events: mpsc::Sender<UpstreamEvent>,
    open_tx: oneshot::Sender<()>,
) {
    let mut open_tx = Some(open_tx);

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let event = UpstreamEvent::parse(epoch, text);
                if event.kind == UpstreamEventKind::Open {
                    if let Some(tx) = open_tx.take() {
                        let _ = tx.send(());
                    }
                }
                if events.send(event).await.is_err() {
                    return;
                }
            }
            Ok(Message::Close(frame)) => {
                debug!(epoch, ?frame, "upstream sent close");
                break;
            }
            // Binary, ping and pong frames from the service carry nothing
            // we route
            Ok(_) => {}
            Err(e) => {
                warn!(epoch, "upstream read failed: {e}");
                let _ = events
                    .send(UpstreamEvent::synthetic_error(epoch, &e.to_string()))
                    .await;
                break;
            }
        }
    }

    let _ = events.send(UpstreamEvent::synthetic_close(epoch)).await;
}

/// Append recognition parameters to the service URL as query pairs.
fn build_url(base: &str, recognition: &Value) -> String {
    let mut url = base.to_string();
    if let Some(params) = recognition.as_object() {
        let mut separator = if url.contains('?') { '&' } else { '?' };
        for (key, value) in params {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let _ = write!(url, "{separator}{key}={rendered}");
            separator = '&';
        }
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn build_url_without_params() {
        let url = build_url("wss://api.example.com/v1/listen", &Value::Null);
        assert_eq!(url, "wss://api.example.com/v1/listen");
    }

    #[test]
    fn build_url_appends_query_pairs() {
        let url = build_url(
            "wss://api.example.com/v1/listen",
            &json!({ "language": "en", "interim_results": true, "sample_rate": 16000 }),
        );
        assert!(url.starts_with("wss://api.example.com/v1/listen?"));
        assert!(url.contains("language=en"));
        assert!(url.contains("interim_results=true"));
        assert!(url.contains("sample_rate=16000"));
    }

    #[test]
    fn build_url_respects_existing_query() {
        let url = build_url(
            "wss://api.example.com/v1/listen?tier=base",
            &json!({ "language": "en" }),
        );
        assert_eq!(url, "wss://api.example.com/v1/listen?tier=base&language=en");
    }
}
