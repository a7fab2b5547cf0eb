pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod ledger;
pub mod session;
pub mod upstream;

pub use auth::{Admission, AdmissionControl, BypassAdmission, SharedKeyAdmission};
pub use config::Config;
pub use error::{PreAdmissionError, UpstreamError};
pub use http::{create_router, AppState};
pub use ledger::{MemoryLedger, UsageIncrement, UsageLedger};
pub use session::{
    BridgeConfig, SessionBridge, SessionRegistry, SessionState, TerminateReason,
};
pub use upstream::{UpstreamConfig, UpstreamEvent, UpstreamEventKind, UpstreamHandle};
