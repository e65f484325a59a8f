//! Crate-level error types

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O failure (socket bind, accept loop)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine task is gone
    #[error("Engine has shut down")]
    EngineClosed,
}
