use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::keepalive::{Keepalive, KeepaliveTick};
use super::messages::{ControlMessage, ServerMessage, CODE_PROCESSING_FAILED, CODE_UPSTREAM_UNAVAILABLE};
use super::meter::UsageMeter;
use super::registry::{SessionEntry, SessionRegistry};
use super::router::{self, InboundFrame};
use super::transport::{ClientFrame, ClientSocket};
use crate::auth::Admission;
use crate::config::Config;
use crate::error::UpstreamError;
use crate::ledger::UsageLedger;
use crate::upstream::sanitize::sanitize_payload;
use crate::upstream::{UpstreamConfig, UpstreamEvent, UpstreamEventKind, UpstreamHandle};

/// Session lifecycle. `Terminating` is absorbing: every transition out
/// of it except the final `Terminated` mark is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Active,
    Reinitializing,
    Terminating,
    Terminated,
}

impl SessionState {
    fn is_terminal(self) -> bool {
        matches!(self, Self::Terminating | Self::Terminated)
    }
}

/// Why a session ended. Carried in the close frame sent to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateReason {
    ClientClosed,
    ClientError,
    UpstreamUnavailable,
    Unresponsive,
    Shutdown,
}

impl TerminateReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client closed",
            Self::ClientError => "client transport error",
            Self::UpstreamUnavailable => "upstream unavailable",
            Self::Unresponsive => "unresponsive",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Per-session bridge settings, derived from the service `Config`.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub upstream: UpstreamConfig,
    pub keepalive_period: Duration,
    /// Whether an upstream error event observed before the connection
    /// ever reached readiness ends the session
    pub terminate_on_early_upstream_error: bool,
}

impl BridgeConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            upstream: UpstreamConfig {
                url: config.upstream.url.clone(),
                credential: config.upstream.credential.clone(),
                recognition: config.upstream.recognition.clone(),
                connect_timeout: Duration::from_secs(config.upstream.connect_timeout_secs),
            },
            keepalive_period: Duration::from_secs(config.session.keepalive_secs),
            terminate_on_early_upstream_error: config.upstream.terminate_on_early_error,
        }
    }
}

/// Outcome of one `select!` pass in the event loop.
enum Step {
    Client(Option<Result<ClientFrame, String>>),
    Upstream(UpstreamEvent),
    Keepalive(KeepaliveTick),
    Cancelled,
}

/// Owns one client connection's full lifecycle: lazy upstream
/// (re)connection, frame routing, keepalive liveness, usage metering,
/// and the single idempotent teardown path.
pub struct SessionBridge<S: ClientSocket> {
    id: Uuid,
    principal_id: String,
    remaining_secs: Option<f64>,
    state: SessionState,
    socket: S,
    registry: SessionRegistry,
    config: BridgeConfig,
    upstream: Option<UpstreamHandle>,
    upstream_tx: mpsc::Sender<UpstreamEvent>,
    upstream_rx: mpsc::Receiver<UpstreamEvent>,
    /// Bumped on every upstream connect; events from superseded
    /// connections carry an older epoch and are dropped
    epoch: u64,
    upstream_ever_ready: bool,
    keepalive: Keepalive,
    meter: UsageMeter,
    cancel: CancellationToken,
    /// One-shot teardown guard
    terminated: AtomicBool,
}

impl<S: ClientSocket> SessionBridge<S> {
    pub fn new(
        socket: S,
        admission: Admission,
        registry: SessionRegistry,
        ledger: Arc<dyn UsageLedger>,
        config: BridgeConfig,
    ) -> Self {
        let (upstream_tx, upstream_rx) = mpsc::channel(64);
        let keepalive = Keepalive::new(config.keepalive_period);
        let meter = UsageMeter::new(admission.principal_id.clone(), ledger);

        Self {
            id: Uuid::new_v4(),
            principal_id: admission.principal_id,
            remaining_secs: admission.remaining_secs,
            state: SessionState::Initializing,
            socket,
            registry,
            config,
            upstream: None,
            upstream_tx,
            upstream_rx,
            epoch: 0,
            upstream_ever_ready: false,
            keepalive,
            meter,
            cancel: CancellationToken::new(),
            terminated: AtomicBool::new(false),
        }
    }

    /// Drive the session to completion. Every exit path converges on the
    /// one teardown below.
    pub async fn run(mut self) {
        let reason = match self.start().await {
            Ok(()) => self.event_loop().await,
            Err(reason) => reason,
        };
        self.terminate(reason).await;
    }

    /// Register, establish the upstream connection, and acknowledge
    /// readiness to the client.
    async fn start(&mut self) -> Result<(), TerminateReason> {
        self.registry
            .insert(
                self.id,
                SessionEntry {
                    principal_id: self.principal_id.clone(),
                    started_at: Utc::now(),
                    cancel: self.cancel.clone(),
                },
            )
            .await;
        info!(session = %self.id, principal = %self.principal_id, "session starting");

        match self.connect_upstream().await {
            Ok(()) => {
                self.state = SessionState::Active;
                let ready = ServerMessage::Ready {
                    session_id: self.id.to_string(),
                    remaining_secs: self.remaining_secs,
                };
                self.send_server_message(&ready)
                    .await
                    .map_err(|_| TerminateReason::ClientError)?;
                Ok(())
            }
            Err(e) => {
                error!(session = %self.id, "upstream connection failed during startup: {e}");
                let notice = ServerMessage::Error {
                    code: CODE_UPSTREAM_UNAVAILABLE,
                    message: "transcription service unavailable".into(),
                };
                let _ = self.send_server_message(&notice).await;
                Err(TerminateReason::UpstreamUnavailable)
            }
        }
    }

    async fn event_loop(&mut self) -> TerminateReason {
        loop {
            let step = tokio::select! {
                frame = self.socket.recv() => Step::Client(frame),
                event = self.upstream_rx.recv() => match event {
                    Some(event) => Step::Upstream(event),
                    // The bridge holds a sender, so this cannot close
                    None => continue,
                },
                tick = self.keepalive.tick() => Step::Keepalive(tick),
                _ = self.cancel.cancelled() => Step::Cancelled,
            };

            let outcome = match step {
                Step::Client(Some(Ok(frame))) => self.on_client_frame(frame).await,
                Step::Client(Some(Err(e))) => {
                    warn!(session = %self.id, "client read failed: {e}");
                    Some(TerminateReason::ClientError)
                }
                Step::Client(None) => Some(TerminateReason::ClientClosed),
                Step::Upstream(event) => self.on_upstream_event(event).await,
                Step::Keepalive(KeepaliveTick::Ping) => {
                    match self.socket.send(ClientFrame::Ping(Vec::new())).await {
                        Ok(()) => None,
                        Err(_) => Some(TerminateReason::ClientError),
                    }
                }
                Step::Keepalive(KeepaliveTick::Unresponsive) => {
                    warn!(session = %self.id, "client missed keepalive cycle");
                    Some(TerminateReason::Unresponsive)
                }
                Step::Cancelled => Some(TerminateReason::Shutdown),
            };

            if let Some(reason) = outcome {
                return reason;
            }
        }
    }

    /// Route one inbound client frame. No-op once terminating.
    async fn on_client_frame(&mut self, frame: ClientFrame) -> Option<TerminateReason> {
        if self.state.is_terminal() {
            return None;
        }

        match frame {
            ClientFrame::Pong(_) => {
                self.keepalive.mark_alive();
                None
            }
            ClientFrame::Ping(_) => None,
            ClientFrame::Close(_) => Some(TerminateReason::ClientClosed),
            ClientFrame::Text(text) => self.route_payload(text.into_bytes()).await,
            ClientFrame::Binary(data) => self.route_payload(data).await,
        }
    }

    async fn route_payload(&mut self, data: Vec<u8>) -> Option<TerminateReason> {
        match router::classify(data) {
            InboundFrame::Control(ControlMessage::Stop) => {
                info!(session = %self.id, "client requested stop");
                if let Some(mut handle) = self.upstream.take() {
                    handle.finish().await;
                }
                self.meter.pause().await;
                None
            }
            // `start` after admission, and unrecognized types, are
            // advisory by contract
            InboundFrame::Control(_) => None,
            InboundFrame::Media(bytes) => self.forward_media(bytes).await,
        }
    }

    /// Forward one media frame upstream, lazily re-establishing the
    /// connection if a previous one was closed. A failed
    /// re-initialization drops the frame but keeps the session.
    async fn forward_media(&mut self, bytes: Vec<u8>) -> Option<TerminateReason> {
        if self.upstream.is_none() {
            self.state = SessionState::Reinitializing;
            match self.connect_upstream().await {
                Ok(()) => {
                    self.state = SessionState::Active;
                }
                Err(e) => {
                    self.state = SessionState::Active;
                    warn!(
                        session = %self.id,
                        "upstream re-initialization failed, dropping media frame: {e}"
                    );
                    return None;
                }
            }
        }

        let handle = self.upstream.as_mut()?;
        if let Err(e) = handle.send(bytes).await {
            warn!(session = %self.id, "media forward failed: {e}");
            let notice = ServerMessage::Error {
                code: CODE_PROCESSING_FAILED,
                message: "audio processing failed".into(),
            };
            if self.send_server_message(&notice).await.is_err() {
                return Some(TerminateReason::ClientError);
            }
        }
        None
    }

    async fn on_upstream_event(&mut self, event: UpstreamEvent) -> Option<TerminateReason> {
        if self.state.is_terminal() {
            return None;
        }
        if event.epoch != self.epoch {
            debug!(
                session = %self.id,
                event_epoch = event.epoch,
                current_epoch = self.epoch,
                "dropping event from superseded upstream connection"
            );
            return None;
        }

        match event.kind {
            UpstreamEventKind::Transcript => {
                // Forwarded byte-for-byte; never sanitized by contract
                match self.socket.send(ClientFrame::Text(event.raw)).await {
                    Ok(()) => None,
                    Err(_) => Some(TerminateReason::ClientError),
                }
            }
            UpstreamEventKind::UtteranceEnd => {
                self.meter.checkpoint(false).await;
                self.forward_sanitized(&event).await
            }
            UpstreamEventKind::Close => {
                info!(session = %self.id, "upstream closed, will reconnect on next media frame");
                if let Some(mut handle) = self.upstream.take() {
                    handle.finish().await;
                }
                self.meter.pause().await;
                None
            }
            UpstreamEventKind::Error => {
                if let Some(reason) = self.forward_sanitized(&event).await {
                    return Some(reason);
                }
                if !self.upstream_ever_ready && self.config.terminate_on_early_upstream_error {
                    error!(session = %self.id, "upstream error before readiness");
                    Some(TerminateReason::UpstreamUnavailable)
                } else {
                    warn!(session = %self.id, "upstream error event, session continues");
                    None
                }
            }
            UpstreamEventKind::Open => {
                // Readiness was already acknowledged with `ready` when
                // the connect resolved
                debug!(session = %self.id, "upstream open event");
                None
            }
            UpstreamEventKind::SpeechStarted
            | UpstreamEventKind::SpeechEnded
            | UpstreamEventKind::Warning
            | UpstreamEventKind::Metadata
            | UpstreamEventKind::Other => self.forward_sanitized(&event).await,
        }
    }

    /// Finalize any previous handle, then establish a fresh upstream
    /// connection and start the usage clock.
    async fn connect_upstream(&mut self) -> Result<(), UpstreamError> {
        if let Some(mut old) = self.upstream.take() {
            old.finish().await;
        }
        self.epoch += 1;
        let handle =
            UpstreamHandle::connect(&self.config.upstream, self.epoch, self.upstream_tx.clone())
                .await?;
        self.upstream = Some(handle);
        self.upstream_ever_ready = true;
        self.meter.start();
        Ok(())
    }

    async fn forward_sanitized(&mut self, event: &UpstreamEvent) -> Option<TerminateReason> {
        let clean = sanitize_payload(&event.payload, &self.config.upstream.credential);
        match serde_json::to_string(&clean) {
            Ok(text) => match self.socket.send(ClientFrame::Text(text)).await {
                Ok(()) => None,
                Err(_) => Some(TerminateReason::ClientError),
            },
            Err(e) => {
                // Never let a sanitization failure propagate; the event
                // is dropped instead
                warn!(session = %self.id, "sanitized payload unserializable, event dropped: {e}");
                None
            }
        }
    }

    async fn send_server_message(&mut self, message: &ServerMessage) -> Result<(), String> {
        let text = serde_json::to_string(message).map_err(|e| e.to_string())?;
        self.socket.send(ClientFrame::Text(text)).await
    }

    /// The single teardown path. Guarded to execute at most once no
    /// matter how many exit paths reach it.
    pub async fn terminate(&mut self, reason: TerminateReason) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state = SessionState::Terminating;
        info!(session = %self.id, reason = reason.as_str(), "session terminating");

        // The keepalive timer is owned by the event loop, which has
        // already exited by the time we get here.
        if let Some(mut handle) = self.upstream.take() {
            handle.finish().await;
        }
        self.meter.checkpoint(true).await;
        self.registry.remove(&self.id).await;

        let close = ClientFrame::Close(Some((1000, reason.as_str().to_string())));
        let _ = self.socket.send(close).await;

        self.state = SessionState::Terminated;
        info!(
            session = %self.id,
            usage_secs = self.meter.accumulated().as_secs_f64(),
            "session terminated"
        );
    }
}
