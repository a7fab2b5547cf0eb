//! Per-session bridge and accounting pipeline.
//!
//! One `SessionBridge` owns one client connection's full lifecycle:
//! - lazy upstream (re)connection through the upstream bridge
//! - control-vs-media routing of inbound frames
//! - keepalive ping/pong liveness
//! - usage metering checkpoints toward the ledger
//! - a single idempotent teardown path every exit converges on
//!
//! `SessionRegistry` tracks the live set for introspection and the
//! coordinated shutdown sweep.

mod bridge;
mod keepalive;
pub mod messages;
mod meter;
mod registry;
pub mod router;
pub mod transport;

pub use bridge::{BridgeConfig, SessionBridge, SessionState, TerminateReason};
pub use keepalive::{Keepalive, KeepaliveTick};
pub use meter::UsageMeter;
pub use registry::{SessionEntry, SessionRegistry, SessionSummary};
pub use transport::{ClientFrame, ClientSocket};
