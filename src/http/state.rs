use std::sync::Arc;

use tokio_util::task::TaskTracker;

use crate::auth::AdmissionControl;
use crate::ledger::UsageLedger;
use crate::session::{BridgeConfig, SessionRegistry};

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Live sessions (session id → entry)
    pub registry: SessionRegistry,

    /// Usage ledger collaborator
    pub ledger: Arc<dyn UsageLedger>,

    /// Pre-admission collaborator
    pub admission: Arc<dyn AdmissionControl>,

    /// Settings handed to each session bridge
    pub bridge_config: Arc<BridgeConfig>,

    /// Tracks session tasks so shutdown can wait for their teardowns
    pub sessions: TaskTracker,
}

impl AppState {
    pub fn new(
        registry: SessionRegistry,
        ledger: Arc<dyn UsageLedger>,
        admission: Arc<dyn AdmissionControl>,
        bridge_config: BridgeConfig,
    ) -> Self {
        Self {
            registry,
            ledger,
            admission,
            bridge_config: Arc::new(bridge_config),
            sessions: TaskTracker::new(),
        }
    }
}
