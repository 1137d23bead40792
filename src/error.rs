//! Unified error types for Veil-Oxide

use thiserror::Error;

/// Unified Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for Veil-Oxide
///
/// The session controller decides retry-vs-fail based on variants, never on
/// message strings. `is_transient` is the single classification point.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error (malformed identity list, bad config file)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Fingerprint preset name not registered
    #[error("Unknown fingerprint preset: {0}")]
    UnknownPreset(String),

    /// No ACTIVE identity left in the pool
    #[error("Identity pool exhausted: no active identity available")]
    PoolExhausted,

    /// Browser process failed to start (fatal for the session)
    #[error("Browser launch failed: {0}")]
    BrowserLaunch(String),

    /// WebSocket errors
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Browser protocol errors
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation timed out
    #[error("Operation timeout: {0}")]
    Timeout(String),

    /// Connection reset by the browser
    #[error("Connection reset: {0}")]
    ConnectionReset(String),

    /// Target (page/context) closed unexpectedly
    #[error("Target closed: {0}")]
    TargetClosed(String),

    /// Element not found (logical, never retried)
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Invalid URL (logical, never retried)
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Navigation failed for a non-transient reason
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// Script execution failed (logical, never retried)
    #[error("Script execution failed: {0}")]
    ScriptExecution(String),

    /// Snapshot file is not valid serialized state
    #[error("Corrupt storage snapshot: {0}")]
    CorruptSnapshot(String),

    /// Operation on a session that was never started
    #[error("Session not started")]
    SessionNotStarted,

    /// Operation on a closed session
    #[error("Session is closed")]
    SessionClosed,

    /// Retry budget spent; wraps the last underlying error
    #[error("Session exhausted after {attempts} attempts: {source}")]
    SessionExhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new WebSocket error
    pub fn websocket<S: Into<String>>(msg: S) -> Self {
        Error::WebSocket(msg.into())
    }

    /// Create a new protocol error
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Error::Protocol(msg.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Error::Timeout(msg.into())
    }

    /// Create a new target-closed error
    pub fn target_closed<S: Into<String>>(msg: S) -> Self {
        Error::TargetClosed(msg.into())
    }

    /// Create a new element-not-found error
    pub fn element_not_found<S: Into<String>>(selector: S) -> Self {
        Error::ElementNotFound(selector.into())
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Error::Configuration(msg.into())
    }

    /// Create a new browser-launch error
    pub fn browser_launch<S: Into<String>>(msg: S) -> Self {
        Error::BrowserLaunch(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Whether a retry has a chance of succeeding.
    ///
    /// Transient failures (timeouts, resets, targets dying under us) are
    /// retried by the session controller; logical failures (bad selector,
    /// bad URL, script errors) will never succeed without changing the
    /// request and fail immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_)
                | Error::ConnectionReset(_)
                | Error::TargetClosed(_)
                | Error::WebSocket(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(Error::timeout("navigate").is_transient());
        assert!(Error::websocket("reset").is_transient());
        assert!(Error::ConnectionReset("peer".into()).is_transient());
        assert!(Error::target_closed("page gone").is_transient());
    }

    #[test]
    fn logical_errors_are_not_transient() {
        assert!(!Error::element_not_found("#missing").is_transient());
        assert!(!Error::InvalidUrl("not-a-url".into()).is_transient());
        assert!(!Error::ScriptExecution("boom".into()).is_transient());
        assert!(!Error::PoolExhausted.is_transient());
        assert!(!Error::browser_launch("no chrome").is_transient());
    }

    #[test]
    fn exhaustion_preserves_source() {
        let inner = Error::timeout("goto");
        let err = Error::SessionExhausted {
            attempts: 4,
            source: Box::new(inner),
        };

        let msg = err.to_string();
        assert!(msg.contains("4 attempts"));
        assert!(msg.contains("goto"));

        // The underlying cause stays reachable through the source chain.
        let source = std::error::Error::source(&err).expect("source");
        assert!(source.to_string().contains("goto"));
    }
}
