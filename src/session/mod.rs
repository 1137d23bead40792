//! Session lifecycle and orchestration
//!
//! A session ties together one identity, one fingerprint profile, and one
//! browser context. The controller owns the lifecycle (start, operate,
//! close) and routes every operation through the retry policy; interactions
//! optionally go through the human-behavior simulator.

mod controller;
mod retry;

pub use controller::SessionController;
pub use retry::RetryPolicy;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, no browser resources yet
    Created,
    /// Browser context and page are live
    Started,
    /// Resources released; terminal
    Closed,
}
