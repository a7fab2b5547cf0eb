//! Shared test fixtures: a scripted mock of the upstream transcription
//! service and a channel-backed client socket.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use scribe_gateway::session::transport::{ClientFrame, ClientSocket};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// How a mock upstream connection behaves after the WebSocket handshake.
#[derive(Debug, Clone)]
pub enum UpstreamBehavior {
    /// Send the open confirmation (after any scripted preamble frames),
    /// then answer every binary frame with a transcript result.
    Echo { preamble: Vec<String> },
    /// Complete the handshake but never confirm open.
    NeverOpen,
}

pub struct MockUpstream {
    pub url: String,
    pub connections: Arc<AtomicUsize>,
}

impl MockUpstream {
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Start a mock transcription service on an ephemeral port.
pub async fn spawn_upstream(behavior: UpstreamBehavior) -> MockUpstream {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));

    let accepted = connections.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            accepted.fetch_add(1, Ordering::SeqCst);
            let behavior = behavior.clone();
            tokio::spawn(serve_connection(stream, behavior));
        }
    });

    MockUpstream {
        url: format!("ws://{addr}/listen"),
        connections,
    }
}

async fn serve_connection(stream: tokio::net::TcpStream, behavior: UpstreamBehavior) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };

    match behavior {
        UpstreamBehavior::NeverOpen => {
            // Drain frames until the peer goes away
            while let Some(Ok(_)) = ws.next().await {}
        }
        UpstreamBehavior::Echo { preamble } => {
            if ws
                .send(Message::Text(r#"{"type":"Open"}"#.to_string()))
                .await
                .is_err()
            {
                return;
            }
            for frame in preamble {
                if ws.send(Message::Text(frame)).await.is_err() {
                    return;
                }
            }
            while let Some(Ok(message)) = ws.next().await {
                match message {
                    Message::Binary(data) => {
                        let transcript = format!(
                            r#"{{"type":"Results","is_final":false,"bytes":{},"channel":{{"alternatives":[{{"transcript":"hello"}}]}}}}"#,
                            data.len()
                        );
                        if ws.send(Message::Text(transcript)).await.is_err() {
                            return;
                        }
                    }
                    Message::Text(text) if text.contains("CloseStream") => {
                        let _ = ws.close(None).await;
                        return;
                    }
                    Message::Close(_) => return,
                    _ => {}
                }
            }
        }
    }
}

/// Channel-backed `ClientSocket`: tests script inbound frames and
/// observe everything the bridge sends.
pub struct ScriptedSocket {
    inbound: mpsc::Receiver<ClientFrame>,
    outbound: mpsc::UnboundedSender<ClientFrame>,
}

pub struct ScriptedClient {
    pub to_bridge: mpsc::Sender<ClientFrame>,
    pub from_bridge: mpsc::UnboundedReceiver<ClientFrame>,
}

pub fn scripted_socket() -> (ScriptedSocket, ScriptedClient) {
    let (to_bridge, inbound) = mpsc::channel(32);
    let (outbound, from_bridge) = mpsc::unbounded_channel();
    (
        ScriptedSocket { inbound, outbound },
        ScriptedClient {
            to_bridge,
            from_bridge,
        },
    )
}

#[async_trait]
impl ClientSocket for ScriptedSocket {
    async fn recv(&mut self) -> Option<Result<ClientFrame, String>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn send(&mut self, frame: ClientFrame) -> Result<(), String> {
        self.outbound
            .send(frame)
            .map_err(|_| "client gone".to_string())
    }
}

impl ScriptedClient {
    /// Wait for the next text frame from the bridge.
    pub async fn next_text(&mut self) -> String {
        loop {
            match self.expect_frame().await {
                ClientFrame::Text(text) => return text,
                _ => continue,
            }
        }
    }

    /// Wait for the close frame, skipping anything else.
    pub async fn next_close(&mut self) -> Option<(u16, String)> {
        loop {
            match self.expect_frame().await {
                ClientFrame::Close(frame) => return frame,
                _ => continue,
            }
        }
    }

    pub async fn expect_frame(&mut self) -> ClientFrame {
        tokio::time::timeout(std::time::Duration::from_secs(5), self.from_bridge.recv())
            .await
            .expect("timed out waiting for a frame from the bridge")
            .expect("bridge dropped its socket without a close frame")
    }
}
