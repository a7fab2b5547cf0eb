use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use scribe_gateway::{
    create_router, AdmissionControl, AppState, BridgeConfig, BypassAdmission, Config, MemoryLedger,
    SessionRegistry, SharedKeyAdmission, UsageLedger,
};
use tracing::{info, warn};

/// How long the shutdown sweep waits for session teardowns to finish.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "scribe-gateway", about = "Streaming transcription gateway")]
struct Args {
    /// Configuration file (without extension)
    #[arg(long, default_value = "config/scribe-gateway")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config).context("Failed to load configuration")?;
    info!("{} starting", cfg.service.name);

    let ledger = MemoryLedger::spawn();
    let shared_ledger: Arc<dyn UsageLedger> = Arc::new(ledger.clone());

    let admission: Arc<dyn AdmissionControl> = if cfg.auth.bypass {
        warn!(
            principal = %cfg.auth.debug_principal,
            "admission bypass enabled, all connections admitted"
        );
        Arc::new(BypassAdmission::new(cfg.auth.debug_principal.clone()))
    } else {
        Arc::new(SharedKeyAdmission::new(cfg.auth.tokens.clone()))
    };

    let registry = SessionRegistry::new();
    let state = AppState::new(
        registry.clone(),
        shared_ledger.clone(),
        admission,
        BridgeConfig::from_config(&cfg),
    );
    let trackers = state.sessions.clone();
    let app = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("listening on {}", addr);

    let shutdown = async move {
        shutdown_signal().await;
        info!("shutdown signal received, sweeping sessions");

        registry.shutdown_all().await;
        trackers.close();
        if tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, trackers.wait())
            .await
            .is_err()
        {
            warn!("session drain timed out, some teardowns may be incomplete");
        }

        if let Err(e) = shared_ledger.flush_all().await {
            warn!("final ledger flush failed: {e}");
        }
        info!("shutdown sweep complete");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => warn!("failed to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
