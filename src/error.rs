//! Error types for the Turnstile engine.

use thiserror::Error;

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Invalid configuration, reported at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure of the store backing the limiter
    #[error("Limiter backend error: {0}")]
    Backend(String),

    /// An admission check was attempted with an empty key
    #[error("Empty {0} key")]
    EmptyKey(&'static str),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
