//! Chrome DevTools Protocol backend
//!
//! Launches a Chromium process with remote debugging enabled and drives it
//! over the DevTools WebSocket. `connection` owns the JSON-RPC plumbing,
//! `context` the process lifecycle and context-level state, `page` the
//! per-target operations.

mod connection;
mod context;
mod page;
mod types;

pub use connection::CdpConnection;
pub use context::{ChromiumBackend, ChromiumContext};
pub use page::CdpPage;
