//! Upstream bridge: one streaming-transcription connection per handle.
//!
//! `UpstreamHandle` owns the service WebSocket, a reader task that
//! translates wire frames into `UpstreamEvent`s, and a graceful `finish`
//! path. `sanitize` scrubs transport internals from any payload before
//! it is forwarded to a client.

mod connection;
mod events;
pub mod sanitize;

pub use connection::{UpstreamConfig, UpstreamHandle};
pub use events::{UpstreamEvent, UpstreamEventKind};
