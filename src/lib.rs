//! Veil-Oxide: anti-detection browser automation core
//!
//! This library drives real browsers through sessions that blend in:
//! rotating network identities with ban bookkeeping, consistent fingerprint
//! spoofing, human-like input simulation, and persisted cookie/storage state.

pub mod error;
pub mod config;

pub mod backend;
pub mod behavior;
pub mod fingerprint;
pub mod identity;
pub mod session;
pub mod storage;

// Re-exports
pub use error::{Error, Result};

pub use backend::cdp::ChromiumBackend;
pub use backend::{BrowserBackend, ContextHandle, LaunchSpec, PageHandle};
pub use behavior::HumanBehavior;
pub use config::SessionConfig;
pub use fingerprint::{FingerprintProfile, ProfileGenerator, Spoofer};
pub use identity::{Identity, IdentityPool};
pub use session::{SessionController, SessionState};
pub use storage::StorageSnapshot;

/// Veil-Oxide library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
