//! Per-session usage metering.
//!
//! Tracks a running checkpoint-start timestamp, initialized when the
//! upstream connection becomes ready and paused whenever the session has
//! no active upstream connection. Each checkpoint converts elapsed
//! wall-clock time into one `UsageIncrement`; the final checkpoint fires
//! exactly once, during teardown, and flushes the principal so the
//! ledger reflects the whole connected time even when no utterance
//! boundary ever fired.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use crate::ledger::{UsageIncrement, UsageLedger};

pub struct UsageMeter {
    principal_id: String,
    ledger: Arc<dyn UsageLedger>,
    checkpoint_start: Option<Instant>,
    accumulated: Duration,
    finalized: bool,
}

impl UsageMeter {
    pub fn new(principal_id: impl Into<String>, ledger: Arc<dyn UsageLedger>) -> Self {
        Self {
            principal_id: principal_id.into(),
            ledger,
            checkpoint_start: None,
            accumulated: Duration::ZERO,
            finalized: false,
        }
    }

    /// Start (or resume) the usage clock. No-op while already running.
    pub fn start(&mut self) {
        if !self.finalized && self.checkpoint_start.is_none() {
            self.checkpoint_start = Some(Instant::now());
        }
    }

    /// Checkpoint and stop the clock; used when the upstream connection
    /// goes away without ending the session.
    pub async fn pause(&mut self) {
        self.checkpoint(false).await;
        self.checkpoint_start = None;
    }

    /// Emit one increment covering the time since the last checkpoint.
    ///
    /// A final checkpoint is emitted even with zero elapsed time (a
    /// session whose upstream never became ready still bills exactly one
    /// zero-second final increment), flushes the principal, and makes
    /// every later call a no-op.
    pub async fn checkpoint(&mut self, is_final: bool) {
        if self.finalized {
            return;
        }

        let seconds = match self.checkpoint_start.take() {
            Some(started) => {
                let elapsed = started.elapsed();
                self.accumulated += elapsed;
                if !is_final {
                    self.checkpoint_start = Some(Instant::now());
                }
                elapsed.as_secs_f64()
            }
            // Clock not running: non-final checkpoints have nothing to
            // report, the final one still must fire
            None => {
                if !is_final {
                    return;
                }
                0.0
            }
        };

        if is_final {
            self.finalized = true;
        }

        self.ledger
            .buffer_increment(UsageIncrement {
                principal_id: self.principal_id.clone(),
                seconds,
                is_final,
            })
            .await;

        if is_final {
            if let Err(e) = self.ledger.flush(&self.principal_id).await {
                warn!(principal = %self.principal_id, "final usage flush failed: {e}");
            }
        }
    }

    /// Total usage recorded for this session so far.
    pub fn accumulated(&self) -> Duration {
        self.accumulated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;

    #[tokio::test(start_paused = true)]
    async fn increments_sum_to_connected_time() {
        let ledger = MemoryLedger::spawn();
        let mut meter = UsageMeter::new("alice", Arc::new(ledger.clone()));

        meter.start();
        tokio::time::advance(Duration::from_secs(5)).await;
        meter.checkpoint(false).await;
        tokio::time::advance(Duration::from_secs(7)).await;
        meter.checkpoint(true).await;

        let snapshot = ledger.snapshot().await;
        let total: f64 = snapshot.increments.iter().map(|i| i.seconds).sum();
        assert!((total - 12.0).abs() < 0.01);
        assert_eq!(meter.accumulated(), Duration::from_secs(12));

        let finals: Vec<_> = snapshot.increments.iter().filter(|i| i.is_final).collect();
        assert_eq!(finals.len(), 1);
        assert!((snapshot.principals["alice"].durable_secs - 12.0).abs() < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn final_checkpoint_fires_once_even_when_never_started() {
        let ledger = MemoryLedger::spawn();
        let mut meter = UsageMeter::new("alice", Arc::new(ledger.clone()));

        meter.checkpoint(true).await;
        meter.checkpoint(true).await;
        meter.checkpoint(false).await;

        let snapshot = ledger.snapshot().await;
        assert_eq!(snapshot.increments.len(), 1);
        assert_eq!(snapshot.increments[0].seconds, 0.0);
        assert!(snapshot.increments[0].is_final);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_clock_accrues_nothing() {
        let ledger = MemoryLedger::spawn();
        let mut meter = UsageMeter::new("alice", Arc::new(ledger.clone()));

        meter.start();
        tokio::time::advance(Duration::from_secs(3)).await;
        meter.pause().await;
        tokio::time::advance(Duration::from_secs(60)).await;
        meter.start();
        tokio::time::advance(Duration::from_secs(2)).await;
        meter.checkpoint(true).await;

        let snapshot = ledger.snapshot().await;
        let total: f64 = snapshot.increments.iter().map(|i| i.seconds).sum();
        assert!((total - 5.0).abs() < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn non_final_checkpoint_without_clock_emits_nothing() {
        let ledger = MemoryLedger::spawn();
        let mut meter = UsageMeter::new("alice", Arc::new(ledger.clone()));

        meter.checkpoint(false).await;

        let snapshot = ledger.snapshot().await;
        assert!(snapshot.increments.is_empty());
    }
}
