//! Error types for the goal tracking engine.

/// Top-level error type for the reminder engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A tracker task could not be created or the registry refused it.
    #[error("scheduling error: {0}")]
    Scheduling(String),

    /// Goal store read/write error.
    #[error("store error: {0}")]
    Store(String),

    /// Reminder delivery error.
    #[error("notify error: {0}")]
    Notify(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Rejected input (e.g. a non-positive goal).
    #[error("invalid input: {0}")]
    Validation(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, EngineError>;
