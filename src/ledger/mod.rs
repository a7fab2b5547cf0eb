//! Usage ledger boundary.
//!
//! Sessions emit `UsageIncrement`s toward the durable credit store. The
//! store itself is an external collaborator; this module defines its
//! contract and provides `MemoryLedger`, an in-process implementation
//! backed by a single bookkeeping task. Routing every increment through
//! one task serializes concurrent writes per principal, so two sessions
//! billing the same principal can never lose an update.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

/// One metering emission toward the ledger.
///
/// Exactly one increment per session carries `is_final = true`, emitted
/// during teardown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageIncrement {
    pub principal_id: String,
    pub seconds: f64,
    #[serde(rename = "final")]
    pub is_final: bool,
}

/// Contract of the external durable credit store.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Buffer one increment. Non-blocking from the session's point of
    /// view; durability is deferred to `flush`.
    async fn buffer_increment(&self, increment: UsageIncrement);

    /// Durably commit everything buffered for one principal.
    async fn flush(&self, principal_id: &str) -> Result<()>;

    /// Durably commit every buffered increment. Called once during
    /// process shutdown, after the session registry sweep.
    async fn flush_all(&self) -> Result<()>;
}

/// Per-principal bookkeeping inside the ledger task.
#[derive(Debug, Default, Clone, Serialize)]
pub struct PrincipalUsage {
    /// Seconds buffered but not yet flushed
    pub buffered_secs: f64,
    /// Seconds committed by flushes
    pub durable_secs: f64,
    /// Count of final increments observed (one per session)
    pub final_count: u64,
}

/// Snapshot of ledger state, for introspection and tests.
#[derive(Debug, Default, Clone)]
pub struct LedgerSnapshot {
    pub principals: HashMap<String, PrincipalUsage>,
    pub increments: Vec<UsageIncrement>,
}

enum LedgerCommand {
    Increment(UsageIncrement),
    Flush {
        principal_id: String,
        ack: oneshot::Sender<()>,
    },
    FlushAll {
        ack: oneshot::Sender<()>,
    },
    Snapshot {
        ack: oneshot::Sender<LedgerSnapshot>,
    },
}

/// In-memory ledger driven by a dedicated task and a command channel.
#[derive(Clone)]
pub struct MemoryLedger {
    tx: mpsc::Sender<LedgerCommand>,
}

impl MemoryLedger {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(ledger_loop(rx));
        Self { tx }
    }

    /// Current ledger state. Used by tests and introspection endpoints.
    pub async fn snapshot(&self) -> LedgerSnapshot {
        let (ack, rx) = oneshot::channel();
        if self.tx.send(LedgerCommand::Snapshot { ack }).await.is_err() {
            return LedgerSnapshot::default();
        }
        rx.await.unwrap_or_default()
    }
}

#[async_trait]
impl UsageLedger for MemoryLedger {
    async fn buffer_increment(&self, increment: UsageIncrement) {
        if self
            .tx
            .send(LedgerCommand::Increment(increment))
            .await
            .is_err()
        {
            warn!("ledger task gone, dropping usage increment");
        }
    }

    async fn flush(&self, principal_id: &str) -> Result<()> {
        let (ack, rx) = oneshot::channel();
        self.tx
            .send(LedgerCommand::Flush {
                principal_id: principal_id.to_string(),
                ack,
            })
            .await
            .map_err(|_| anyhow::anyhow!("ledger task gone"))?;
        rx.await.map_err(|_| anyhow::anyhow!("ledger task gone"))?;
        Ok(())
    }

    async fn flush_all(&self) -> Result<()> {
        let (ack, rx) = oneshot::channel();
        self.tx
            .send(LedgerCommand::FlushAll { ack })
            .await
            .map_err(|_| anyhow::anyhow!("ledger task gone"))?;
        rx.await.map_err(|_| anyhow::anyhow!("ledger task gone"))?;
        Ok(())
    }
}

async fn ledger_loop(mut rx: mpsc::Receiver<LedgerCommand>) {
    let mut principals: HashMap<String, PrincipalUsage> = HashMap::new();
    let mut increments: Vec<UsageIncrement> = Vec::new();

    while let Some(command) = rx.recv().await {
        match command {
            LedgerCommand::Increment(increment) => {
                if increment.seconds < 0.0 {
                    warn!(
                        principal = %increment.principal_id,
                        seconds = increment.seconds,
                        "negative usage increment dropped"
                    );
                    continue;
                }
                let usage = principals
                    .entry(increment.principal_id.clone())
                    .or_default();
                usage.buffered_secs += increment.seconds;
                if increment.is_final {
                    usage.final_count += 1;
                }
                increments.push(increment);
            }
            LedgerCommand::Flush { principal_id, ack } => {
                if let Some(usage) = principals.get_mut(&principal_id) {
                    usage.durable_secs += usage.buffered_secs;
                    usage.buffered_secs = 0.0;
                    info!(
                        principal = %principal_id,
                        durable_secs = usage.durable_secs,
                        "usage flushed"
                    );
                }
                let _ = ack.send(());
            }
            LedgerCommand::FlushAll { ack } => {
                for (principal_id, usage) in &mut principals {
                    if usage.buffered_secs > 0.0 {
                        usage.durable_secs += usage.buffered_secs;
                        usage.buffered_secs = 0.0;
                        info!(
                            principal = %principal_id,
                            durable_secs = usage.durable_secs,
                            "usage flushed"
                        );
                    }
                }
                let _ = ack.send(());
            }
            LedgerCommand::Snapshot { ack } => {
                let _ = ack.send(LedgerSnapshot {
                    principals: principals.clone(),
                    increments: increments.clone(),
                });
            }
        }
    }
}
