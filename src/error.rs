//! Error types for the call engine.

/// Top-level error type for the call orchestration engine.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// A turn exchange was attempted with an empty session id or message.
    #[error("missing sessionId or message")]
    Validation,

    /// The dialogue backend failed while bootstrapping a session.
    #[error("session bootstrap failed: {0}")]
    Bootstrap(String),

    /// The dialogue backend failed during a turn exchange.
    #[error("agent response failed: {0}")]
    Response(String),

    /// Speech recognition failed with a non-recoverable engine code.
    #[error("speech recognition error: {0}")]
    Recognition(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, CallError>;
