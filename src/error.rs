//! Crate-wide error types.

use thiserror::Error;

/// Result type for printforge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the consolidation core.
#[derive(Error, Debug)]
pub enum Error {
    /// No machine-code or metadata entry could be located, or a referenced
    /// package archive is unreadable.
    #[error("parse error: {0}")]
    Parse(String),

    /// A package failed the required-file / well-formedness contract.
    /// Carries the failing entry names so the operator can see why the
    /// artifact was rejected.
    #[error("validation failed: {}", errors.join("; "))]
    Validation { errors: Vec<String> },

    /// Referenced Order/Job row or stored object is missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Storage download/upload failure.
    #[error("remote IO error: {0}")]
    RemoteIo(String),

    /// Queue state machine rejected a transition.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Invalid caller input, e.g. a zero quantity.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A pipeline operation exceeded its deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Configuration loading or validation error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Parse error from anything displayable.
    pub fn parse(msg: impl std::fmt::Display) -> Self {
        Error::Parse(msg.to_string())
    }
}
